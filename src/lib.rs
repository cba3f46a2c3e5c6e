//! # contract-qa
//!
//! Agentic question answering over a contract portfolio.
//!
//! A turn sends the user's question to an LLM that may call a fixed set
//! of tools: read-only SQL over contract metadata and scoped searches
//! over chunked contract text. Every generated tool call passes a
//! guardrail before it reaches a store, and the final answer must carry
//! citations that satisfy a strict contract. Attempts that break the
//! contract or run out of budget are retried from scratch.
//!
//! ## Modules
//!
//! - [`agent`]: orchestrator, agentic loop, tools, guardrail, answer
//!   validation and retries
//! - [`store`]: relational and vector store backends
//! - [`core`]: search filters, requests and scored chunks
//! - [`cli`]: command-line interface
//! - [`error`]: error types

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod store;

pub use agent::{
    AgentConfig, AnswerEnvelope, ContractSearchAgent, MetadataAgent, Orchestrator, TurnConstraints,
    TurnReport, TurnRequest,
};
pub use core::{DocumentRef, SearchFilter};
pub use error::{AgentError, Error, Result, TurnError};
