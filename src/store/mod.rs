//! Backing stores queried by tools.
//!
//! The engine only sees the [`RelationalStore`] and [`VectorStore`]
//! traits. Implementations must never mutate their backend: the
//! guardrail is the first line of defense, the store's read-only
//! execution path is the second.

pub mod embedding;
#[cfg(feature = "opensearch")]
pub mod opensearch;
pub mod sqlite;

use async_trait::async_trait;

use crate::core::{ScoredChunk, SearchRequest};
use crate::error::StoreError;

pub use embedding::{Embedder, OpenAiEmbedder};
#[cfg(feature = "opensearch")]
pub use opensearch::{OpenSearchConfig, OpenSearchStore};
pub use sqlite::SqliteStore;

/// One result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Structured contract metadata.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Runs `sql` in a read-only transaction and returns at most
    /// `row_cap` rows.
    async fn execute_read_only_query(&self, sql: &str, row_cap: usize)
    -> Result<Vec<Row>, StoreError>;

    /// DDL of the queryable tables, used in the system prompt.
    async fn describe_schema(&self) -> Result<String, StoreError>;
}

/// Chunked contract text with keyword and vector retrieval.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Returns up to `request.top_k` chunks matching the request.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<ScoredChunk>, StoreError>;
}
