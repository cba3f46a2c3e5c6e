//! SQL agent over structured contract metadata.

use std::sync::Arc;

use tracing::debug;

use super::config::AgentConfig;
use super::executor::metadata_tools;
use super::prompt::{PromptSet, render_metadata_prompt};
use super::registry::ToolRegistry;
use super::traits::Agent;
use crate::error::AgentError;
use crate::store::RelationalStore;

/// Answers questions by generating read-only SQL.
///
/// The system prompt embeds the store's schema, read once at
/// construction.
#[derive(Debug)]
pub struct MetadataAgent {
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    registry: ToolRegistry,
}

impl MetadataAgent {
    /// Reads the store schema and builds the agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if the schema cannot be read.
    pub async fn new(
        config: &AgentConfig,
        prompts: &PromptSet,
        store: Arc<dyn RelationalStore>,
    ) -> Result<Self, AgentError> {
        let schema = store
            .describe_schema()
            .await
            .map_err(|e| AgentError::InvalidConfig {
                message: format!("cannot read {} schema: {e}", store.name()),
            })?;
        debug!(store = store.name(), schema_bytes = schema.len(), "loaded schema");
        Self::with_schema(config, &prompts.metadata, &schema, store)
    }

    /// Builds the agent from an already known schema.
    ///
    /// # Errors
    ///
    /// Propagates tool registration errors.
    pub fn with_schema(
        config: &AgentConfig,
        template: &str,
        schema: &str,
        store: Arc<dyn RelationalStore>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: render_metadata_prompt(template, schema),
            registry: metadata_tools(store, config.sql_row_cap)?,
        })
    }
}

impl Agent for MetadataAgent {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
