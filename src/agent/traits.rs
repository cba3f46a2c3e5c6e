//! Agent trait definition.
//!
//! An agent is a fixed pairing of system prompt, model settings and tool
//! registry. The orchestrator drives any agent through the same loop.

use super::message::{ChatMessage, ChatRequest};
use super::registry::ToolRegistry;

/// A configured question-answering agent.
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Fully rendered system prompt, including the answer contract.
    fn system_prompt(&self) -> &str;

    /// Whether to ask the provider for JSON output. Advisory only.
    fn json_mode(&self) -> bool {
        true
    }

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum completion tokens per model call.
    fn max_tokens(&self) -> u32 {
        4096
    }

    /// Tools this agent may call.
    fn registry(&self) -> &ToolRegistry;

    /// Builds a tool-enabled request over `messages`.
    fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
            tools: self.registry().definitions(),
        }
    }
}
