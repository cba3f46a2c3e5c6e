//! Error types for contract-qa.
//!
//! Errors are layered by how far they are allowed to travel:
//! [`GuardrailViolation`] and [`StoreError`] stay inside a turn as tool
//! errors shown to the model, [`AgentError`] ends one attempt, and
//! [`TurnError`] is the only failure a caller of a turn ever sees.

use thiserror::Error;

use crate::agent::message::TokenUsage;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for library and CLI operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent configuration or provider error.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Terminal turn failure.
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// Backend store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while running one attempt of an agent turn.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key configured for the provider.
    #[error("API key missing: set OPENAI_API_KEY or CONTRACT_QA_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not supported.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// The LLM provider call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status when known.
        status: Option<u16>,
    },

    /// The provider returned a response that could not be interpreted.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Parse error message.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// A tool name was registered twice.
    #[error("tool already registered: {name}")]
    DuplicateTool {
        /// Tool name.
        name: String,
    },

    /// The model kept calling tools past the iteration budget.
    #[error("iteration budget exceeded after {max_iterations} iterations")]
    IterationBudgetExceeded {
        /// Iteration limit that was reached.
        max_iterations: usize,
    },

    /// Cumulative token usage crossed the turn's ceiling.
    #[error("token budget exceeded: used {used} of {budget}")]
    TokenBudgetExceeded {
        /// Tokens consumed so far in this attempt.
        used: u64,
        /// Configured ceiling.
        budget: u64,
    },

    /// The final answer failed validation.
    #[error("answer validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The caller's request is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },

    /// The turn was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    /// Whether a fresh attempt of the whole turn could succeed.
    ///
    /// Provider client errors (4xx other than 408 and 429) are final.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ApiRequest { status, .. } => {
                !matches!(status, Some(400..=407 | 409..=428 | 430..=499))
            }
            Self::ResponseParse { .. }
            | Self::IterationBudgetExceeded { .. }
            | Self::TokenBudgetExceeded { .. }
            | Self::Validation(_) => true,
            _ => false,
        }
    }
}

/// Rule that a generated tool call broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailRule {
    /// Statement is empty or does not start with `SELECT`.
    NotSelect,
    /// More than one statement was submitted.
    MultipleStatements,
    /// A mutating keyword appears as a standalone token.
    BlockedVerb,
    /// Neither `WHERE` nor `LIMIT` is present.
    MissingScope,
    /// `LIMIT` is not followed by an integer literal.
    InvalidLimit,
    /// The statement could not be tokenized.
    Malformed,
    /// A search would scan the entire corpus.
    UnscopedSearch,
}

impl GuardrailRule {
    /// Short stable name used in tool error payloads and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSelect => "not_select",
            Self::MultipleStatements => "multiple_statements",
            Self::BlockedVerb => "blocked_verb",
            Self::MissingScope => "missing_scope",
            Self::InvalidLimit => "invalid_limit",
            Self::Malformed => "malformed",
            Self::UnscopedSearch => "unscoped_search",
        }
    }
}

impl std::fmt::Display for GuardrailRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated tool call rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct GuardrailViolation {
    /// Which rule was broken.
    pub rule: GuardrailRule,
    /// Explanation the model can act on.
    pub detail: String,
}

impl GuardrailViolation {
    pub(crate) fn new(rule: GuardrailRule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

/// A final answer that does not satisfy the answer contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The payload is not a JSON object.
    #[error("answer is not a JSON object: {message}")]
    NotJson {
        /// Parser message.
        message: String,
    },

    /// A required field is absent.
    #[error("missing field {field}")]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// The answer text is not a non-empty string.
    #[error("answer text empty or not a string")]
    EmptyAnswer,

    /// The citations field is not an object.
    #[error("citations is not an object")]
    CitationsNotObject,

    /// A citation value is a number, boolean, null, array or object.
    #[error("citation value not a string: {key}")]
    CitationNotString {
        /// Citation key.
        key: String,
    },

    /// A citation value is empty or whitespace.
    #[error("citation value empty: {key}")]
    EmptyCitation {
        /// Citation key.
        key: String,
    },

    /// A citation value is a placeholder instead of a source.
    #[error("citation value is a placeholder: {key} = {value:?}")]
    PlaceholderCitation {
        /// Citation key.
        key: String,
        /// Offending value.
        value: String,
    },

    /// A citation key is not of the form `docN`.
    #[error("malformed citation key {key}")]
    MalformedKey {
        /// Offending key.
        key: String,
    },

    /// The answer text references a key missing from the map.
    #[error("dangling reference {key}")]
    DanglingReference {
        /// Referenced key.
        key: String,
    },

    /// Keys are not numbered in first-appearance order.
    #[error("citation keys out of order: expected {expected}, found {found}")]
    KeyOrder {
        /// Key expected at this position.
        expected: String,
        /// Key actually found.
        found: String,
    },

    /// A citation entry is never referenced in the answer text.
    #[error("unused citation {key}")]
    UnusedCitation {
        /// Unreferenced key.
        key: String,
    },
}

/// Terminal failure of a turn, returned to the caller.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Every attempt failed with a retryable error.
    #[error("turn failed after {attempts} attempt(s): {last_reason}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Reason the final attempt failed.
        last_reason: String,
        /// Tokens spent across all attempts.
        usage: TokenUsage,
    },

    /// An attempt failed with an error retrying cannot fix.
    #[error("turn rejected on attempt {attempts}: {reason}")]
    Rejected {
        /// Attempts made.
        attempts: u32,
        /// Failure reason.
        reason: String,
    },

    /// The caller cancelled the turn.
    #[error("turn cancelled")]
    Cancelled,
}

impl TurnError {
    /// Number of attempts made before the turn ended.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Rejected { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }

    /// Sets the token total carried by [`TurnError::Exhausted`].
    #[must_use]
    pub fn with_usage(mut self, total: TokenUsage) -> Self {
        if let Self::Exhausted { usage, .. } = &mut self {
            *usage = total;
        }
        self
    }
}

/// Failures from the relational or vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open or reach the backend.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The backend rejected or failed the query.
    #[error("query failed: {0}")]
    Query(String),

    /// The statement would modify the database.
    #[error("statement is not read-only")]
    NotReadOnly,

    /// The backend response could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Computing a query embedding failed.
    #[error("embedding failed: {0}")]
    Embedding(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// CLI command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Invalid command-line input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command execution failed.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// Output could not be rendered.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AgentError::Validation(ValidationError::EmptyAnswer).is_retryable());
        assert!(AgentError::IterationBudgetExceeded { max_iterations: 5 }.is_retryable());
        assert!(
            AgentError::TokenBudgetExceeded {
                used: 10,
                budget: 5
            }
            .is_retryable()
        );
        assert!(!AgentError::Cancelled.is_retryable());
        assert!(
            !AgentError::InvalidRequest {
                message: "empty".to_string()
            }
            .is_retryable()
        );
        assert!(!AgentError::ApiKeyMissing.is_retryable());
    }

    #[test]
    fn test_provider_status_classification() {
        let api = |status| AgentError::ApiRequest {
            message: "request failed".to_string(),
            status,
        };
        for status in [None, Some(408), Some(429), Some(500), Some(503)] {
            assert!(api(status).is_retryable(), "{status:?}");
        }
        for status in [Some(400), Some(401), Some(403), Some(404), Some(422)] {
            assert!(!api(status).is_retryable(), "{status:?}");
        }
    }

    #[test]
    fn test_validation_reasons() {
        let err = ValidationError::CitationNotString {
            key: "doc1".to_string(),
        };
        assert!(err.to_string().starts_with("citation value not a string"));

        let err = ValidationError::DanglingReference {
            key: "doc2".to_string(),
        };
        assert_eq!(err.to_string(), "dangling reference doc2");
    }

    #[test]
    fn test_turn_error_attempts() {
        let err = TurnError::Exhausted {
            attempts: 3,
            last_reason: "bad".to_string(),
            usage: TokenUsage::default(),
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(TurnError::Cancelled.attempts(), 0);

        let spent = TokenUsage {
            prompt_tokens: 40,
            completion_tokens: 20,
            total_tokens: 60,
        };
        match err.with_usage(spent) {
            TurnError::Exhausted { usage, .. } => assert_eq!(usage.total(), 60),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            TurnError::Cancelled.with_usage(spent),
            TurnError::Cancelled
        ));
    }
}
