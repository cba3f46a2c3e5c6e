//! Search requests and scored chunks returned by the vector store.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::filter::SearchFilter;

/// Retrieval strategy for a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Keyword and vector retrieval combined.
    #[default]
    Hybrid,
    /// Keyword (BM25) only.
    Text,
    /// Vector similarity only.
    Semantic,
}

/// A normalized, guardrail-checked search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    /// Free-text query; `None` lists matching chunks in reading order.
    pub query: Option<String>,
    /// Effective filter after merging the turn scope.
    pub filter: SearchFilter,
    /// Maximum chunks to return.
    pub top_k: usize,
    /// Retrieval strategy.
    pub mode: SearchMode,
    /// Record id of a chunk to find neighbours of, excluding itself.
    pub similar_to: Option<String>,
}

impl SearchRequest {
    /// Non-blank query text, if any.
    pub fn query_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// One chunk of contract text with its retrieval score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Owning project.
    pub project_id: String,
    /// Document id within the project.
    pub reference_doc_id: String,
    /// Chunk number within the document.
    pub chunk_id: i64,
    /// Document title.
    pub document_title: String,
    /// Preferred citation label.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Contract type of the document.
    #[serde(default)]
    pub contract_type: Option<String>,
    /// Section headings from the document root to this chunk.
    #[serde(default)]
    pub section_hierarchy: Vec<String>,
    /// Chunk text.
    pub content: String,
    /// Retrieval score.
    #[serde(default)]
    pub score: f64,
}

impl ScoredChunk {
    /// Stable id of the chunk: `project-reference-chunk`.
    pub fn record_id(&self) -> String {
        format!("{}-{}-{}", self.project_id, self.reference_doc_id, self.chunk_id)
    }

    /// Label the model should use as a citation value.
    pub fn source_label(&self) -> String {
        self.display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{}", self.document_title, self.chunk_id))
    }
}

/// Renders chunks as markdown context for the model.
pub fn render_context(heading: Option<&str>, chunks: &[ScoredChunk]) -> String {
    let mut out = String::new();
    if let Some(heading) = heading {
        let _ = writeln!(out, "# Search Results for: {heading}\n");
    }
    if chunks.is_empty() {
        out.push_str("No matching contract text was found.\n");
        return out;
    }
    for (i, chunk) in chunks.iter().enumerate() {
        let section = if chunk.section_hierarchy.is_empty() {
            "-".to_string()
        } else {
            chunk.section_hierarchy.join(" > ")
        };
        let _ = write!(
            out,
            "## Search Result {n}\n\n\
             | Document | Contract Type | Section | Record |\n\
             |---|---|---|---|\n\
             | {doc} | {ctype} | {section} | {record} |\n\n\
             {content}\n\n",
            n = i + 1,
            doc = chunk.source_label(),
            ctype = chunk.contract_type.as_deref().unwrap_or("-"),
            record = chunk.record_id(),
            content = chunk.content.trim(),
        );
    }
    out
}
