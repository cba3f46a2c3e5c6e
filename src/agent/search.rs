//! Search agent over chunked contract text.

use std::sync::Arc;

use super::config::AgentConfig;
use super::executor::search_tools;
use super::prompt::{PromptSet, with_answer_format};
use super::registry::ToolRegistry;
use super::traits::Agent;
use crate::error::AgentError;
use crate::store::VectorStore;

/// Answers questions from retrieved contract passages.
#[derive(Debug)]
pub struct ContractSearchAgent {
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    registry: ToolRegistry,
}

impl ContractSearchAgent {
    /// Builds the agent with the five search tools over `store`.
    ///
    /// # Errors
    ///
    /// Propagates tool registration errors.
    pub fn new(
        config: &AgentConfig,
        prompts: &PromptSet,
        store: &Arc<dyn VectorStore>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: with_answer_format(&prompts.search),
            registry: search_tools(store)?,
        })
    }
}

impl Agent for ContractSearchAgent {
    fn name(&self) -> &'static str {
        "search"
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
