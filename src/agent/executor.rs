//! Tool handlers backed by the relational and vector stores.
//!
//! Handlers receive arguments that already passed the guardrail, so they
//! only enforce tool-specific preconditions and format backend output
//! for the model.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::json;
use tracing::debug;

use super::guardrail::{SanitizedArguments, SanitizedSql};
use super::registry::{ToolFailure, ToolHandler, ToolRegistry};
use super::tool::ToolName;
use crate::core::{SearchRequest, render_context};
use crate::error::AgentError;
use crate::store::{RelationalStore, VectorStore};

fn expect_sql(args: SanitizedArguments) -> Result<SanitizedSql, ToolFailure> {
    match args {
        SanitizedArguments::Sql(sql) => Ok(sql),
        SanitizedArguments::Search(_) => Err(ToolFailure::InvalidArguments(
            "expected a SQL statement".to_string(),
        )),
    }
}

fn expect_search(args: SanitizedArguments) -> Result<SearchRequest, ToolFailure> {
    match args {
        SanitizedArguments::Search(request) => Ok(request),
        SanitizedArguments::Sql(_) => Err(ToolFailure::InvalidArguments(
            "expected a search request".to_string(),
        )),
    }
}

/// `execute_sql_query`: read-only SQL over contract metadata.
pub struct SqlQueryTool {
    store: Arc<dyn RelationalStore>,
    row_cap: usize,
}

impl SqlQueryTool {
    /// Handler returning at most `row_cap` rows per query.
    pub fn new(store: Arc<dyn RelationalStore>, row_cap: usize) -> Self {
        Self { store, row_cap }
    }
}

#[async_trait]
impl ToolHandler for SqlQueryTool {
    fn name(&self) -> ToolName {
        ToolName::ExecuteSqlQuery
    }

    async fn invoke(&self, args: SanitizedArguments) -> Result<String, ToolFailure> {
        let sql = expect_sql(args)?;
        debug!(store = self.store.name(), query = %sql.query, "executing sql");
        let rows = self
            .store
            .execute_read_only_query(&sql.query, self.row_cap)
            .await?;
        let payload = json!({
            "success": true,
            "row_count": rows.len(),
            "rows": rows,
            "query": sql.query,
            "explanation": sql.explanation,
        });
        Ok(payload.to_string())
    }
}

/// `hybrid_search`, `search_by_project`, `search_similar_documents` and
/// `search_by_document`.
///
/// They differ only in how the guardrail builds the request.
pub struct SearchTool {
    name: ToolName,
    store: Arc<dyn VectorStore>,
}

impl SearchTool {
    /// Search across everything in the turn's scope.
    pub fn hybrid(store: Arc<dyn VectorStore>) -> Self {
        Self {
            name: ToolName::HybridSearch,
            store,
        }
    }

    /// Search within one project.
    pub fn by_project(store: Arc<dyn VectorStore>) -> Self {
        Self {
            name: ToolName::SearchByProject,
            store,
        }
    }

    /// Neighbours of one chunk.
    pub fn similar(store: Arc<dyn VectorStore>) -> Self {
        Self {
            name: ToolName::SearchSimilarDocuments,
            store,
        }
    }

    /// Read the chunks of one document.
    pub fn by_document(store: Arc<dyn VectorStore>) -> Self {
        Self {
            name: ToolName::SearchByDocument,
            store,
        }
    }
}

#[async_trait]
impl ToolHandler for SearchTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn invoke(&self, args: SanitizedArguments) -> Result<String, ToolFailure> {
        let request = expect_search(args)?;
        let chunks = self.store.search(&request).await?;
        debug!(
            tool = %self.name,
            store = self.store.name(),
            hits = chunks.len(),
            "search complete"
        );
        let heading = request
            .similar_to
            .as_ref()
            .map(|id| format!("chunks similar to {id}"))
            .or_else(|| request.query_text().map(str::to_string))
            .or_else(|| {
                (request.filter.documents.len() == 1).then(|| request.filter.documents[0].label())
            });
        Ok(render_context(heading.as_deref(), &chunks))
    }
}

/// `compare_filtered_documents`: one search per filtered document.
pub struct CompareDocumentsTool {
    store: Arc<dyn VectorStore>,
}

impl CompareDocumentsTool {
    /// Handler over `store`.
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for CompareDocumentsTool {
    fn name(&self) -> ToolName {
        ToolName::CompareFilteredDocuments
    }

    async fn invoke(&self, args: SanitizedArguments) -> Result<String, ToolFailure> {
        let request = expect_search(args)?;
        let documents = &request.filter.documents;
        if documents.len() < 2 {
            return Err(ToolFailure::InvalidArguments(format!(
                "comparison needs at least two documents in the active filter, found {}",
                documents.len()
            )));
        }

        let searches = documents.iter().map(|doc| {
            let per_doc = SearchRequest {
                query: request.query.clone(),
                filter: request.filter.for_document(doc),
                top_k: request.top_k,
                mode: request.mode,
                similar_to: None,
            };
            async move { (doc, self.store.search(&per_doc).await) }
        });

        let query = request.query_text().unwrap_or_default();
        let mut out = format!("# Comparison for: {query}\n\n");
        for (doc, result) in join_all(searches).await {
            let chunks = result?;
            out.push_str("## Document: ");
            out.push_str(&doc.label());
            out.push_str("\n\n");
            out.push_str(&render_context(None, &chunks));
        }
        debug!(documents = documents.len(), "comparison complete");
        Ok(out)
    }
}

/// Tools for the metadata agent.
///
/// # Errors
///
/// Never in practice; registration errors surface as [`AgentError`].
pub fn metadata_tools(
    store: Arc<dyn RelationalStore>,
    row_cap: usize,
) -> Result<ToolRegistry, AgentError> {
    ToolRegistry::new().with(Arc::new(SqlQueryTool::new(store, row_cap)))
}

/// Tools for the contract search agent.
///
/// # Errors
///
/// Never in practice; registration errors surface as [`AgentError`].
pub fn search_tools(store: &Arc<dyn VectorStore>) -> Result<ToolRegistry, AgentError> {
    ToolRegistry::new()
        .with(Arc::new(SearchTool::hybrid(Arc::clone(store))))?
        .with(Arc::new(SearchTool::by_project(Arc::clone(store))))?
        .with(Arc::new(SearchTool::similar(Arc::clone(store))))?
        .with(Arc::new(SearchTool::by_document(Arc::clone(store))))?
        .with(Arc::new(CompareDocumentsTool::new(Arc::clone(store))))
}
