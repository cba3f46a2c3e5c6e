//! Provider factory.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Creates the [`LlmProvider`] named by `config.provider`.
///
/// Only `"openai"` is built in; it also covers Azure and local
/// `OpenAI`-compatible servers through `base_url`.
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for any other name.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
