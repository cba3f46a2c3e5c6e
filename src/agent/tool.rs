//! Tool definitions, calls, typed arguments, and results.
//!
//! Tool arguments arrive from the model as untrusted JSON. They are
//! decoded into [`ToolInvocation`], a tagged union over the known tool
//! names, only after the dispatcher has confirmed the name is registered,
//! so an unknown or malformed call becomes a tool error the model can
//! correct rather than a fatal parse failure.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::SearchMode;

/// Maximum accepted size of a tool call's JSON arguments.
pub const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// Names of the tools the engine knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// Read-only SQL against the contract metadata store.
    ExecuteSqlQuery,
    /// Hybrid search across all contracts in scope.
    HybridSearch,
    /// Search within one project.
    SearchByProject,
    /// Nearest neighbours of one chunk.
    SearchSimilarDocuments,
    /// Read chunks of one document.
    SearchByDocument,
    /// Run one query against each filtered document.
    CompareFilteredDocuments,
}

impl ToolName {
    /// Every known tool.
    pub const ALL: [Self; 6] = [
        Self::ExecuteSqlQuery,
        Self::HybridSearch,
        Self::SearchByProject,
        Self::SearchSimilarDocuments,
        Self::SearchByDocument,
        Self::CompareFilteredDocuments,
    ];

    /// Wire name of the tool.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecuteSqlQuery => "execute_sql_query",
            Self::HybridSearch => "hybrid_search",
            Self::SearchByProject => "search_by_project",
            Self::SearchSimilarDocuments => "search_similar_documents",
            Self::SearchByDocument => "search_by_document",
            Self::CompareFilteredDocuments => "compare_filtered_documents",
        }
    }

    /// Looks up a tool by wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Schema advertised to the model.
    pub fn definition(self) -> ToolDefinition {
        match self {
            Self::ExecuteSqlQuery => def_execute_sql_query(),
            Self::HybridSearch => def_hybrid_search(),
            Self::SearchByProject => def_search_by_project(),
            Self::SearchSimilarDocuments => def_search_similar_documents(),
            Self::SearchByDocument => def_search_by_document(),
            Self::CompareFilteredDocuments => def_compare_filtered_documents(),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of `execute_sql_query`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqlQueryArgs {
    /// SQL statement.
    pub query: String,
    /// Model's stated intent, echoed back in the result.
    #[serde(default)]
    pub explanation: String,
}

/// Arguments of `hybrid_search`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HybridSearchArgs {
    /// Search text.
    pub query: String,
    /// Result count.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Arguments of `search_by_project`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectSearchArgs {
    /// Project to search.
    pub project_id: String,
    /// Optional search text.
    #[serde(default)]
    pub query: Option<String>,
    /// Retrieval strategy; hybrid when absent.
    #[serde(default)]
    pub search_type: Option<SearchMode>,
    /// Result count.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Arguments of `search_similar_documents`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimilarDocumentsArgs {
    /// Record id of the reference chunk, as shown in search results.
    pub record_id: String,
    /// Result count.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Arguments of `search_by_document`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentSearchArgs {
    /// Owning project.
    pub project_id: String,
    /// Document id within the project.
    pub reference_doc_id: String,
    /// Chunk count.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Arguments of `compare_filtered_documents`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompareDocumentsArgs {
    /// Topic to look up in each document.
    pub query: String,
    /// Results per document.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// A decoded tool call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolInvocation {
    /// `execute_sql_query`.
    ExecuteSqlQuery(SqlQueryArgs),
    /// `hybrid_search`.
    HybridSearch(HybridSearchArgs),
    /// `search_by_project`.
    SearchByProject(ProjectSearchArgs),
    /// `search_similar_documents`.
    SearchSimilarDocuments(SimilarDocumentsArgs),
    /// `search_by_document`.
    SearchByDocument(DocumentSearchArgs),
    /// `compare_filtered_documents`.
    CompareFilteredDocuments(CompareDocumentsArgs),
}

impl ToolInvocation {
    /// Decodes raw JSON arguments for the named tool.
    ///
    /// An empty argument string is treated as `{}`.
    pub fn parse(name: &str, raw_arguments: &str) -> Result<Self, String> {
        if raw_arguments.len() > MAX_TOOL_ARGS_LEN {
            return Err(format!(
                "arguments are {} bytes; the limit is {MAX_TOOL_ARGS_LEN}",
                raw_arguments.len()
            ));
        }
        let arguments: serde_json::Value = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|e| format!("arguments are not valid JSON: {e}"))?
        };
        serde_json::from_value(json!({ "name": name, "arguments": arguments }))
            .map_err(|e| format!("invalid arguments for {name}: {e}"))
    }

    /// Tool this invocation targets.
    pub const fn name(&self) -> ToolName {
        match self {
            Self::ExecuteSqlQuery(_) => ToolName::ExecuteSqlQuery,
            Self::HybridSearch(_) => ToolName::HybridSearch,
            Self::SearchByProject(_) => ToolName::SearchByProject,
            Self::SearchSimilarDocuments(_) => ToolName::SearchSimilarDocuments,
            Self::SearchByDocument(_) => ToolName::SearchByDocument,
            Self::CompareFilteredDocuments(_) => ToolName::CompareFilteredDocuments,
        }
    }
}

/// Category of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No handler is registered under the requested name.
    UnknownTool,
    /// Arguments could not be decoded or fail a tool precondition.
    InvalidArguments,
    /// The guardrail rejected the call.
    GuardrailViolation,
    /// The backend failed or timed out.
    Backend,
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The handler produced a payload.
    Success {
        /// Payload text, possibly truncated.
        payload: String,
        /// Whether the payload was cut at the size cap.
        truncated: bool,
    },
    /// The call failed; the message is shown to the model.
    Failure {
        /// Failure category.
        kind: ToolErrorKind,
        /// Explanation.
        message: String,
    },
}

/// The result of dispatching a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub call_id: String,
    /// What happened.
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// Successful result, truncating the payload to `max_bytes`.
    pub fn success(call_id: &str, payload: String, max_bytes: usize) -> Self {
        let (payload, truncated) = truncate_payload(payload, max_bytes);
        Self {
            call_id: call_id.to_string(),
            outcome: ToolOutcome::Success { payload, truncated },
        }
    }

    /// Failed result.
    pub fn failure(call_id: &str, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.to_string(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    /// Whether the call succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Failure category, if the call failed.
    pub const fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Content of the tool-role message sent back to the model.
    pub fn to_message_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload, .. } => payload.clone(),
            ToolOutcome::Failure { kind, message } => json!({
                "success": false,
                "error_kind": kind,
                "error": message,
            })
            .to_string(),
        }
    }
}

/// Cuts `payload` to at most `max_bytes` on a char boundary and appends a
/// marker. Returns whether truncation happened.
pub fn truncate_payload(mut payload: String, max_bytes: usize) -> (String, bool) {
    let total = payload.len();
    if total <= max_bytes {
        return (payload, false);
    }
    let mut cut = max_bytes;
    while cut > 0 && !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    payload.truncate(cut);
    let _ = write!(payload, "\n...[truncated: showing {cut} of {total} bytes]");
    (payload, true)
}

fn def_execute_sql_query() -> ToolDefinition {
    ToolDefinition {
        name: ToolName::ExecuteSqlQuery.as_str().to_string(),
        description: "Run one read-only SELECT statement against the contract metadata \
                      database. Every statement must include a WHERE or LIMIT clause; \
                      LIMIT is capped by the server. Returns matching rows as JSON."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A single SELECT statement."
                },
                "explanation": {
                    "type": "string",
                    "description": "One sentence on what the query retrieves."
                }
            },
            "required": ["query", "explanation"],
            "additionalProperties": false
        }),
    }
}

fn def_hybrid_search() -> ToolDefinition {
    ToolDefinition {
        name: ToolName::HybridSearch.as_str().to_string(),
        description: "Search contract text with combined keyword and semantic retrieval. \
                      Active filters are applied automatically."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in the contract text."
                },
                "top_k": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of passages to return."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_search_by_project() -> ToolDefinition {
    ToolDefinition {
        name: ToolName::SearchByProject.as_str().to_string(),
        description: "Search the contracts of one project. Without a query, returns \
                      passages from the project in document order."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "Project identifier." },
                "query": { "type": "string", "description": "Optional search text." },
                "search_type": {
                    "type": "string",
                    "enum": ["hybrid", "semantic", "text"],
                    "description": "Retrieval strategy for the query. Defaults to hybrid."
                },
                "top_k": { "type": "integer", "minimum": 1 }
            },
            "required": ["project_id"],
            "additionalProperties": false
        }),
    }
}

fn def_search_similar_documents() -> ToolDefinition {
    ToolDefinition {
        name: ToolName::SearchSimilarDocuments.as_str().to_string(),
        description: "Find passages similar to a passage already retrieved, identified by \
                      the record id shown in search results. The reference passage itself \
                      is excluded. Active filters are applied automatically."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "record_id": {
                    "type": "string",
                    "description": "Record id of the reference passage."
                },
                "top_k": { "type": "integer", "minimum": 1 }
            },
            "required": ["record_id"],
            "additionalProperties": false
        }),
    }
}

fn def_search_by_document() -> ToolDefinition {
    ToolDefinition {
        name: ToolName::SearchByDocument.as_str().to_string(),
        description: "Read passages of a single contract in reading order.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "Project identifier." },
                "reference_doc_id": {
                    "type": "string",
                    "description": "Document identifier within the project."
                },
                "top_k": { "type": "integer", "minimum": 1 }
            },
            "required": ["project_id", "reference_doc_id"],
            "additionalProperties": false
        }),
    }
}

fn def_compare_filtered_documents() -> ToolDefinition {
    ToolDefinition {
        name: ToolName::CompareFilteredDocuments.as_str().to_string(),
        description: "Look up the same topic in each of the filtered documents and return \
                      the passages grouped by document. Requires at least two documents \
                      in the active filters."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Topic to compare." },
                "top_k": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Passages per document."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_all_definitions_have_object_schemas() {
        for tool in ToolName::ALL {
            let def = tool.definition();
            assert_eq!(def.name, tool.as_str());
            assert_eq!(def.parameters["type"], "object");
            assert!(def.parameters["required"].is_array());
        }
    }

    #[test]
    fn test_name_parse() {
        assert_eq!(
            ToolName::parse("hybrid_search"),
            Some(ToolName::HybridSearch)
        );
        assert_eq!(ToolName::parse("drop_tables"), None);
    }

    #[test]
    fn test_parse_sql_invocation() {
        let inv = ToolInvocation::parse(
            "execute_sql_query",
            r#"{"query": "SELECT 1 LIMIT 1", "explanation": "smoke"}"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(inv.name(), ToolName::ExecuteSqlQuery);
        match inv {
            ToolInvocation::ExecuteSqlQuery(args) => assert_eq!(args.explanation, "smoke"),
            other => panic!("unexpected invocation: {other:?}"),
        }
    }

    #[test]
    fn test_parse_project_search_type() {
        let inv = ToolInvocation::parse(
            "search_by_project",
            r#"{"project_id": "p1", "query": "rent", "search_type": "semantic"}"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        match inv {
            ToolInvocation::SearchByProject(args) => {
                assert_eq!(args.search_type, Some(SearchMode::Semantic));
            }
            other => panic!("unexpected invocation: {other:?}"),
        }

        let err = ToolInvocation::parse(
            "search_by_project",
            r#"{"project_id": "p1", "search_type": "fuzzy"}"#,
        )
        .err()
        .unwrap_or_default();
        assert!(err.contains("fuzzy"), "{err}");
    }

    #[test]
    fn test_parse_similar_documents() {
        let inv = ToolInvocation::parse(
            "search_similar_documents",
            r#"{"record_id": "p1-r1-12", "top_k": 3}"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(inv.name(), ToolName::SearchSimilarDocuments);
        match inv {
            ToolInvocation::SearchSimilarDocuments(args) => {
                assert_eq!(args.record_id, "p1-r1-12");
                assert_eq!(args.top_k, Some(3));
            }
            other => panic!("unexpected invocation: {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_required_field() {
        let err = ToolInvocation::parse("search_by_document", r#"{"project_id": "p1"}"#)
            .err()
            .unwrap_or_default();
        assert!(err.contains("reference_doc_id"), "{err}");
    }

    #[test]
    fn test_parse_empty_arguments() {
        let err = ToolInvocation::parse("hybrid_search", "")
            .err()
            .unwrap_or_default();
        assert!(err.contains("query"), "{err}");
    }

    #[test]
    fn test_parse_rejects_oversized() {
        let raw = format!(r#"{{"query": "{}"}}"#, "x".repeat(MAX_TOOL_ARGS_LEN));
        assert!(ToolInvocation::parse("hybrid_search", &raw).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = ToolInvocation::parse("hybrid_search", "{query:")
            .err()
            .unwrap_or_default();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn test_truncate_payload_marks_cut() {
        let (out, truncated) = truncate_payload("abcdefghij".to_string(), 4);
        assert!(truncated);
        assert!(out.starts_with("abcd\n...[truncated: showing 4 of 10 bytes]"));

        let (out, truncated) = truncate_payload("short".to_string(), 100);
        assert!(!truncated);
        assert_eq!(out, "short");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // "é" is two bytes; a cut at 1 must back off to 0.
        let (out, truncated) = truncate_payload("éa".to_string(), 1);
        assert!(truncated);
        assert!(out.starts_with("\n...[truncated: showing 0 of 3 bytes]"));
    }

    #[test]
    fn test_failure_message_content() {
        let result = ToolResult::failure("c1", ToolErrorKind::UnknownTool, "unknown tool: x");
        assert!(!result.is_success());
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
        let content: serde_json::Value =
            serde_json::from_str(&result.to_message_content()).unwrap_or_default();
        assert_eq!(content["success"], false);
        assert_eq!(content["error_kind"], "unknown_tool");
    }
}
