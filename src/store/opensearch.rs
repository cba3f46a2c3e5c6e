//! `OpenSearch` vector store over the chunked contract index.
//!
//! Filters become `term`/`terms` clauses; query text becomes a BM25
//! `multi_match`, optionally combined with a kNN clause when an
//! [`Embedder`] is configured. Searches without query text list chunks
//! in reading order. Similarity searches reuse the stored vector of the
//! reference chunk and exclude that chunk from the hits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::VectorStore;
use super::embedding::Embedder;
use crate::core::{
    DocumentRef, DocumentSource, ScoredChunk, SearchFilter, SearchMode, SearchRequest,
};
use crate::error::StoreError;

const DEFAULT_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX: &str = "contract_chunks";
const DEFAULT_VECTOR_FIELD: &str = "vector";
const TEXT_FIELDS: [&str; 2] = ["content^2", "section_hierarchy"];
/// Longest error body echoed back in a [`StoreError`].
const MAX_ERROR_BODY: usize = 300;

/// Connection settings for the contract index.
#[derive(Clone)]
pub struct OpenSearchConfig {
    /// Cluster base URL.
    pub url: String,
    /// Index holding contract chunks.
    pub index: String,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Name of the dense vector field.
    pub vector_field: String,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            index: DEFAULT_INDEX.to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            vector_field: DEFAULT_VECTOR_FIELD.to_string(),
        }
    }
}

impl OpenSearchConfig {
    /// Reads `CONTRACT_QA_OPENSEARCH_{URL,INDEX,USERNAME,PASSWORD}`.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            url: var("CONTRACT_QA_OPENSEARCH_URL").unwrap_or(defaults.url),
            index: var("CONTRACT_QA_OPENSEARCH_INDEX").unwrap_or(defaults.index),
            username: var("CONTRACT_QA_OPENSEARCH_USERNAME"),
            password: var("CONTRACT_QA_OPENSEARCH_PASSWORD"),
            ..defaults
        }
    }

    fn search_url(&self) -> String {
        format!("{}/{}/_search", self.url.trim_end_matches('/'), self.index)
    }
}

impl std::fmt::Debug for OpenSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchConfig")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .field("vector_field", &self.vector_field)
            .finish_non_exhaustive()
    }
}

/// Read-only client for the contract chunk index.
pub struct OpenSearchStore {
    http: Client,
    config: OpenSearchConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl OpenSearchStore {
    /// Builds the HTTP client. Without an embedder every search runs
    /// as keyword search.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the client cannot be built.
    pub fn new(
        config: OpenSearchConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            config,
            embedder,
        })
    }

    async fn query_vector(&self, request: &SearchRequest) -> Result<Option<Vec<f32>>, StoreError> {
        let Some(text) = request.query_text() else {
            return Ok(None);
        };
        if request.mode == SearchMode::Text {
            return Ok(None);
        }
        match &self.embedder {
            Some(embedder) => embedder.embed(text).await.map(Some),
            None => {
                if request.mode == SearchMode::Semantic {
                    warn!("semantic search requested without an embedder, using keyword search");
                }
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for OpenSearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchStore")
            .field("config", &self.config)
            .field("embedder", &self.embedder.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VectorStore for OpenSearchStore {
    fn name(&self) -> &'static str {
        "opensearch"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<ScoredChunk>, StoreError> {
        let field = &self.config.vector_field;
        let (body, semantic) = if let Some(record_id) = &request.similar_to {
            let vector = self.reference_vector(record_id).await?;
            (build_similar_query(request, &vector, record_id, field), true)
        } else {
            let vector = self.query_vector(request).await?;
            (build_query(request, vector.as_deref(), field), vector.is_some())
        };

        let parsed: SearchResponse = self.post_search(&body).await?;
        let chunks = parsed.into_chunks();
        debug!(
            index = %self.config.index,
            mode = ?request.mode,
            semantic,
            similar_to = request.similar_to.as_deref(),
            hits = chunks.len(),
            "search completed"
        );
        Ok(chunks)
    }
}

impl OpenSearchStore {
    async fn post_search<T: DeserializeOwned>(&self, body: &Value) -> Result<T, StoreError> {
        let mut call = self.http.post(self.config.search_url()).json(body);
        if let Some(ref user) = self.config.username {
            call = call.basic_auth(user, self.config.password.as_ref());
        }
        let response = call
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!(
                "{status}: {}",
                body.chars().take(MAX_ERROR_BODY).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Stored embedding of the chunk with `record_id`.
    async fn reference_vector(&self, record_id: &str) -> Result<Vec<f32>, StoreError> {
        let field = &self.config.vector_field;
        let body = json!({
            "size": 1,
            "query": { "term": { "record_id": record_id } },
            "_source": [field],
        });
        let parsed: Value = self.post_search(&body).await?;
        extract_vector(&parsed, field)
            .ok_or_else(|| StoreError::Query(format!("no chunk found with record_id {record_id}")))
    }
}

fn extract_vector(response: &Value, field: &str) -> Option<Vec<f32>> {
    let raw = response.pointer("/hits/hits/0/_source")?.get(field)?;
    serde_json::from_value(raw.clone()).ok()
}

/// kNN around `vector`, excluding the reference chunk itself.
pub(crate) fn build_similar_query(
    request: &SearchRequest,
    vector: &[f32],
    record_id: &str,
    vector_field: &str,
) -> Value {
    json!({
        "size": request.top_k,
        "query": {
            "bool": {
                "must": [knn_clause(vector_field, vector, request.top_k + 1)],
                "must_not": [{ "term": { "record_id": record_id } }],
                "filter": filter_clauses(&request.filter),
            }
        },
        "_source": { "excludes": [vector_field] },
    })
}

/// Builds the `_search` body for `request`.
pub(crate) fn build_query(
    request: &SearchRequest,
    vector: Option<&[f32]>,
    vector_field: &str,
) -> Value {
    let filters = filter_clauses(&request.filter);
    let size = request.top_k;

    let Some(text) = request.query_text() else {
        return json!({
            "size": size,
            "query": { "bool": { "must": [{ "match_all": {} }], "filter": filters } },
            "sort": [{ "chunk_index": { "order": "asc" } }],
            "_source": { "excludes": [vector_field] },
        });
    };

    let text_clause = json!({
        "multi_match": { "query": text, "fields": TEXT_FIELDS, "type": "best_fields" }
    });
    let bool_query = match (request.mode, vector) {
        (SearchMode::Semantic, Some(v)) => json!({
            "must": [knn_clause(vector_field, v, size)],
            "filter": filters,
        }),
        (SearchMode::Hybrid, Some(v)) => json!({
            "should": [text_clause, knn_clause(vector_field, v, size * 2)],
            "minimum_should_match": 1,
            "filter": filters,
        }),
        _ => json!({
            "must": [text_clause],
            "filter": filters,
        }),
    };

    json!({
        "size": size,
        "query": { "bool": bool_query },
        "_source": { "excludes": [vector_field] },
    })
}

fn knn_clause(field: &str, vector: &[f32], k: usize) -> Value {
    json!({ "knn": { field: { "vector": vector, "k": k } } })
}

/// `term` for one value, `terms` for several.
fn term_or_terms(field: &str, values: &[String]) -> Option<Value> {
    match values {
        [] => None,
        [one] => Some(json!({ "term": { field: one } })),
        many => Some(json!({ "terms": { field: many } })),
    }
}

/// Filter clauses; unfiltered searches are restricted to system content.
fn filter_clauses(filter: &SearchFilter) -> Vec<Value> {
    let doc_keys: Vec<String> = filter.documents.iter().map(DocumentRef::key).collect();
    let mut clauses: Vec<Value> = [
        term_or_terms("project_reference_doc_id", &doc_keys),
        term_or_terms("contract_type", &filter.contract_types),
        term_or_terms("project_id", &filter.project_ids),
    ]
    .into_iter()
    .flatten()
    .collect();

    let source = match filter.doc_source {
        Some(source) => Some(source),
        None if clauses.is_empty() => Some(DocumentSource::System),
        None => None,
    };
    if let Some(source) = source {
        clauses.push(json!({ "term": { "content_source": source.as_str() } }));
    }
    clauses
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: ChunkSource,
}

#[derive(Debug, Deserialize)]
struct ChunkSource {
    project_id: String,
    reference_doc_id: String,
    document_title: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
    content: String,
    chunk_index: i64,
    #[serde(default)]
    section_hierarchy: Option<Hierarchy>,
}

/// Indexed either as one `a > b` path or as a list of headings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Hierarchy {
    Path(String),
    Headings(Vec<String>),
}

impl Hierarchy {
    fn into_headings(self) -> Vec<String> {
        match self {
            Self::Path(path) => path
                .split(" > ")
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Headings(headings) => headings,
        }
    }
}

impl SearchResponse {
    fn into_chunks(self) -> Vec<ScoredChunk> {
        self.hits
            .hits
            .into_iter()
            .map(|hit| {
                let source = hit.source;
                ScoredChunk {
                    project_id: source.project_id,
                    reference_doc_id: source.reference_doc_id,
                    chunk_id: source.chunk_index,
                    document_title: source.document_title,
                    display_name: source.display_name,
                    contract_type: source.contract_type,
                    section_hierarchy: source
                        .section_hierarchy
                        .map(Hierarchy::into_headings)
                        .unwrap_or_default(),
                    content: source.content,
                    score: hit.score.unwrap_or_default(),
                }
            })
            .collect()
    }
}
