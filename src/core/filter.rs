//! Turn-scoped search filters.
//!
//! A filter narrows vector search to specific documents, projects, or
//! contract types. The filter supplied with a turn is merged into every
//! search call the model makes during that turn.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// A single contract document addressed by project and reference id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Owning project.
    pub project_id: String,
    /// Document id within the project.
    pub reference_doc_id: String,
    /// Display title, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
}

impl DocumentRef {
    /// Creates a document reference without a title.
    pub fn new(project_id: impl Into<String>, reference_doc_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            reference_doc_id: reference_doc_id.into(),
            document_title: None,
        }
    }

    /// Combined `project-reference` key stored on every indexed chunk.
    pub fn key(&self) -> String {
        format!("{}-{}", self.project_id, self.reference_doc_id)
    }

    /// Title if present, otherwise the combined key.
    pub fn label(&self) -> String {
        self.document_title.clone().unwrap_or_else(|| self.key())
    }
}

/// Where an indexed document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// Contracts loaded by the ingestion pipeline.
    System,
    /// Contracts uploaded by a user.
    Upload,
}

impl DocumentSource {
    /// Value stored in the index's `content_source` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Upload => "upload",
        }
    }
}

/// Search scope for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
    /// Restrict to these documents.
    pub documents: Vec<DocumentRef>,
    /// Restrict to one content source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_source: Option<DocumentSource>,
    /// Restrict to these contract types.
    #[serde(alias = "contract_type")]
    pub contract_types: Vec<String>,
    /// Restrict to these projects.
    #[serde(alias = "project_id")]
    pub project_ids: Vec<String>,
}

impl SearchFilter {
    /// Whether any narrowing filter is set.
    ///
    /// `doc_source` alone does not count: it selects a partition, not a
    /// subset of documents.
    pub const fn has_filters(&self) -> bool {
        !self.documents.is_empty() || !self.contract_types.is_empty() || !self.project_ids.is_empty()
    }

    /// Whether the filter is completely empty.
    pub const fn is_empty(&self) -> bool {
        !self.has_filters() && self.doc_source.is_none()
    }

    /// Union of two filters. `other`'s source wins when both are set.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for doc in &other.documents {
            if !merged
                .documents
                .iter()
                .any(|d| d.project_id == doc.project_id && d.reference_doc_id == doc.reference_doc_id)
            {
                merged.documents.push(doc.clone());
            }
        }
        extend_unique(&mut merged.contract_types, &other.contract_types);
        extend_unique(&mut merged.project_ids, &other.project_ids);
        if other.doc_source.is_some() {
            merged.doc_source = other.doc_source;
        }
        merged
    }

    /// Returns a copy scoped to a single document.
    #[must_use]
    pub fn for_document(&self, doc: &DocumentRef) -> Self {
        Self {
            documents: vec![doc.clone()],
            doc_source: self.doc_source,
            contract_types: Vec::new(),
            project_ids: Vec::new(),
        }
    }

    /// Markdown summary given to the model as filter context.
    ///
    /// Returns `None` for an empty filter.
    pub fn describe(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = String::from("## Active Filters\n\nAll search results are restricted to:\n");
        if !self.documents.is_empty() {
            out.push_str("- Documents:\n");
            for doc in &self.documents {
                let _ = writeln!(
                    out,
                    "  - {} (project {}, document {})",
                    doc.label(),
                    doc.project_id,
                    doc.reference_doc_id
                );
            }
        }
        if !self.contract_types.is_empty() {
            let _ = writeln!(out, "- Contract types: {}", self.contract_types.join(", "));
        }
        if !self.project_ids.is_empty() {
            let _ = writeln!(out, "- Projects: {}", self.project_ids.join(", "));
        }
        if let Some(source) = self.doc_source {
            let _ = writeln!(out, "- Source: {}", source.as_str());
        }
        Some(out)
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
