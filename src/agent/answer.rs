//! Final-answer contract.
//!
//! The model is asked for `{"answerText": ..., "citations": {"doc1": ...}}`
//! but nothing about that shape is trusted. [`AnswerValidator`] checks
//! the raw text and either builds an [`AnswerEnvelope`] or reports the
//! first violated rule. It never repairs an answer: surrounding
//! whitespace is ignored by the checks but kept in the envelope.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::{Map, Value};

use crate::error::{AgentError, ValidationError};

/// Inline citation marker, e.g. `[doc3]`.
const REFERENCE_PATTERN: &str = r"\[(doc\d+)\]";

/// Citation values that stand in for a source instead of naming one.
const PLACEHOLDER_PATTERN: &str = r"^(?:\[?doc\d*\]?|sources?|documents?|citations?|file|filename|n/?a|none|null|nil|unknown|tbd|true|false|-?\d+(?:\.\d+)?)$";

/// Ordered `docN -> descriptor` map, sorted by citation number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationMap(Vec<(String, String)>);

impl CitationMap {
    /// Descriptor for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of citations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no citations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in citation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for CitationMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A validated answer: the terminal artifact of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEnvelope {
    /// Answer text with inline `[docN]` markers.
    pub answer_text: String,
    /// Sources for every marker in the text.
    pub citations: CitationMap,
    /// Always `true` for an envelope that passed validation.
    pub success: bool,
}

/// Checks raw model output against the answer contract.
#[derive(Debug, Clone)]
pub struct AnswerValidator {
    reference: Regex,
    placeholder: Regex,
}

impl AnswerValidator {
    /// Compiles the validator's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if a pattern fails to
    /// compile.
    pub fn new() -> Result<Self, AgentError> {
        Ok(Self {
            reference: compile(REFERENCE_PATTERN, false)?,
            placeholder: compile(PLACEHOLDER_PATTERN, true)?,
        })
    }

    /// Validates one candidate answer.
    ///
    /// Checks run in a fixed order: JSON shape, answer text, citation
    /// values and keys, dangling references, first-appearance key order,
    /// unused entries.
    pub fn validate(&self, raw: &str) -> Result<AnswerEnvelope, ValidationError> {
        let object = parse_object(raw)?;

        let answer_text = match object.get("answerText").or_else(|| object.get("answer")) {
            None => return Err(ValidationError::MissingField { field: "answerText" }),
            Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
            Some(_) => return Err(ValidationError::EmptyAnswer),
        };

        let raw_citations = match object.get("citations") {
            None => return Err(ValidationError::MissingField { field: "citations" }),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ValidationError::CitationsNotObject),
        };

        let mut entries = Vec::with_capacity(raw_citations.len());
        for (key, value) in raw_citations {
            let number = citation_number(key)
                .ok_or_else(|| ValidationError::MalformedKey { key: key.clone() })?;
            let Value::String(descriptor) = value else {
                return Err(ValidationError::CitationNotString { key: key.clone() });
            };
            let trimmed = descriptor.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::EmptyCitation { key: key.clone() });
            }
            if self.placeholder.is_match(trimmed) {
                return Err(ValidationError::PlaceholderCitation {
                    key: key.clone(),
                    value: trimmed.to_string(),
                });
            }
            entries.push((number, key.clone(), descriptor.clone()));
        }

        let references = self.references(&answer_text);
        if let Some(missing) = references.iter().find(|r| !raw_citations.contains_key(*r)) {
            return Err(ValidationError::DanglingReference {
                key: missing.clone(),
            });
        }
        for (i, found) in references.iter().enumerate() {
            let expected = format!("doc{}", i + 1);
            if *found != expected {
                return Err(ValidationError::KeyOrder {
                    expected,
                    found: found.clone(),
                });
            }
        }

        entries.sort_by_key(|(number, _, _)| *number);
        if let Some((_, unused, _)) = entries.iter().find(|(_, k, _)| !references.contains(k)) {
            return Err(ValidationError::UnusedCitation {
                key: unused.clone(),
            });
        }

        Ok(AnswerEnvelope {
            answer_text,
            citations: CitationMap(entries.into_iter().map(|(_, k, v)| (k, v)).collect()),
            success: true,
        })
    }

    /// Distinct `[docN]` keys in first-appearance order.
    fn references(&self, text: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for capture in self.reference.captures_iter(text) {
            let key = &capture[1];
            if !seen.iter().any(|k| k == key) {
                seen.push(key.to_string());
            }
        }
        seen
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, AgentError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| AgentError::InvalidConfig {
            message: format!("invalid answer pattern: {e}"),
        })
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, ValidationError> {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ValidationError::NotJson {
            message: format!("expected an object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ValidationError::NotJson {
            message: e.to_string(),
        }),
    }
}

/// Removes a surrounding Markdown code fence (```json ... ```).
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// `Some(n)` for keys of the form `docN` with `N >= 1` and no leading zero.
fn citation_number(key: &str) -> Option<u32> {
    let digits = key.strip_prefix("doc")?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
