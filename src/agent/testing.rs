//! Test doubles shared by unit tests.

#![allow(clippy::panic, clippy::missing_docs_in_private_items)]

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::Connection;

use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::provider::LlmProvider;
use super::tool::ToolCall;
use crate::core::{ScoredChunk, SearchRequest};
use crate::error::{AgentError, StoreError};
use crate::store::{SqliteStore, VectorStore};

/// Provider that replays a fixed script and records every request.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, AgentError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(script: Vec<Result<ChatResponse, AgentError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(AgentError::ApiRequest {
                    message: "script exhausted".to_string(),
                    status: None,
                })
            })
    }
}

pub const fn usage(total: u32) -> TokenUsage {
    TokenUsage {
        prompt_tokens: total / 2,
        completion_tokens: total - total / 2,
        total_tokens: total,
    }
}

pub fn text_response(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        usage: usage(20),
        tool_calls: Vec::new(),
        finish_reason: Some("stop".to_string()),
    }
}

pub fn tool_response(calls: &[(&str, &str, &str)]) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        usage: usage(20),
        tool_calls: calls
            .iter()
            .map(|(id, name, arguments)| ToolCall {
                id: (*id).to_string(),
                name: (*name).to_string(),
                arguments: (*arguments).to_string(),
            })
            .collect(),
        finish_reason: Some("tool_calls".to_string()),
    }
}

pub fn chunk(project_id: &str, reference_doc_id: &str, chunk_id: i64, content: &str) -> ScoredChunk {
    ScoredChunk {
        project_id: project_id.to_string(),
        reference_doc_id: reference_doc_id.to_string(),
        chunk_id,
        document_title: format!("{reference_doc_id}.pdf"),
        display_name: None,
        contract_type: Some("Service Agreement".to_string()),
        section_hierarchy: vec!["Term".to_string()],
        content: content.to_string(),
        score: 1.0,
    }
}

/// Vector store over an in-memory chunk list. Applies document and
/// project filters and `top_k`, and records each request.
pub struct StaticVectorStore {
    chunks: Vec<ScoredChunk>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticVectorStore {
    pub fn new(chunks: Vec<ScoredChunk>) -> Self {
        Self {
            chunks,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl VectorStore for StaticVectorStore {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<ScoredChunk>, StoreError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let filter = &request.filter;
        if let Some(id) = &request.similar_to
            && !self.chunks.iter().any(|c| &c.record_id() == id)
        {
            return Err(StoreError::Query(format!("no chunk found with record_id {id}")));
        }
        Ok(self
            .chunks
            .iter()
            .filter(|c| request.similar_to.as_ref() != Some(&c.record_id()))
            .filter(|c| {
                filter.documents.is_empty()
                    || filter.documents.iter().any(|d| {
                        d.project_id == c.project_id && d.reference_doc_id == c.reference_doc_id
                    })
            })
            .filter(|c| filter.project_ids.is_empty() || filter.project_ids.contains(&c.project_id))
            .take(request.top_k)
            .cloned()
            .collect())
    }
}

/// Vector store that always fails.
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Vec<ScoredChunk>, StoreError> {
        Err(StoreError::Connection("index unreachable".to_string()))
    }
}

/// In-memory contract metadata database.
pub fn sample_sqlite() -> SqliteStore {
    let conn = Connection::open_in_memory().unwrap_or_else(|e| panic!("open failed: {e}"));
    conn.execute_batch(
        "CREATE TABLE contract_asmd (
            project_id TEXT NOT NULL,
            reference_doc_id TEXT NOT NULL,
            document_title TEXT NOT NULL,
            contract_type TEXT NOT NULL,
            expiration_date TEXT
        );
        INSERT INTO contract_asmd VALUES
            ('p1', 'r1', 'MSA_Acme.pdf', 'Service Agreement', '2025-06-30'),
            ('p1', 'r2', 'Lease_HQ.pdf', 'Lease', '2027-01-01'),
            ('p2', 'r3', 'SOW_Beta.pdf', 'Service Agreement', '2025-12-31');",
    )
    .unwrap_or_else(|e| panic!("seed failed: {e}"));
    SqliteStore::from_connection(conn).unwrap_or_else(|e| panic!("wrap failed: {e}"))
}
