//! Agentic question answering over contract data.
//!
//! One turn runs an LLM against a fixed tool set until it produces a
//! final answer, then validates that answer's citations. Failed
//! attempts are retried from scratch with backoff.
//!
//! # Architecture
//!
//! ```text
//! TurnRequest → Orchestrator::run_turn
//!   └── RetryController (attempts, backoff)
//!       └── agentic_loop (model ↔ tools, iteration/token budgets)
//!           └── ToolDispatcher
//!               ├── ToolInvocation::parse (typed arguments)
//!               ├── GuardrailPolicy::validate (SQL and search scope)
//!               └── ToolRegistry → ToolHandler (SQLite, OpenSearch)
//!       └── AnswerValidator (citation contract) → AnswerEnvelope
//! ```

pub mod agentic_loop;
pub mod answer;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod guardrail;
pub mod message;
pub mod metadata;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod search;
#[cfg(test)]
pub(crate) mod testing;
pub mod tool;
pub mod traits;

pub use agentic_loop::{LoopLimits, LoopOutcome, agentic_loop};
pub use answer::{AnswerEnvelope, AnswerValidator, CitationMap};
pub use client::create_provider;
pub use config::AgentConfig;
pub use dispatcher::{DispatchLimits, ToolDispatcher};
pub use guardrail::{GuardrailPolicy, MissingScopePolicy, SanitizedArguments};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use metadata::MetadataAgent;
pub use orchestrator::{Orchestrator, TurnConstraints, TurnReport, TurnRequest};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use registry::{ToolHandler, ToolRegistry};
pub use retry::{RetryController, RetryPolicy};
pub use search::ContractSearchAgent;
pub use tool::{ToolCall, ToolDefinition, ToolInvocation, ToolName, ToolResult};
pub use traits::Agent;
