//! Query embeddings for semantic retrieval.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::error::StoreError;

/// Turns query text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one query.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

/// Embedder backed by the `OpenAI` embeddings endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// Uses the provider credentials and embedding model from `config`.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            model: config.embedding_model.clone(),
        }
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text.to_string())
            .build()
            .map_err(|e| StoreError::Embedding(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| StoreError::Embedding("empty embedding response".to_string()))?;
        debug!(model = %self.model, dimensions = vector.len(), "embedded query");
        Ok(vector)
    }
}
