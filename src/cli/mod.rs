//! CLI layer for contract-qa.
//!
//! Provides the command-line interface using clap: asking questions,
//! checking SQL against the guardrail offline, and inspecting schemas,
//! tools and prompts.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{AgentKind, Cli, Commands};
