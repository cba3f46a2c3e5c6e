//! Pluggable LLM provider trait.
//!
//! Implementations translate [`ChatRequest`]/[`ChatResponse`] into a
//! vendor SDK call. The agent loop only ever talks to this trait, which
//! is also where tests substitute a scripted model.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// A chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes one chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] on transport failures and
    /// timeouts.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
