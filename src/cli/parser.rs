//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::agent::ToolName;

/// contract-qa: question answering over a contract portfolio.
///
/// Answers questions with an LLM agent that queries contract metadata
/// with guarded SQL or searches contract text, and returns answers with
/// validated citations.
#[derive(Parser, Debug)]
#[command(name = "contract-qa")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the contract metadata SQLite database.
    #[arg(short, long, env = "CONTRACT_QA_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Which agent answers a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    /// SQL over structured contract metadata.
    #[default]
    Metadata,
    /// Search over chunked contract text.
    Search,
}

impl AgentKind {
    /// Tools the agent is given.
    pub fn tools(self) -> Vec<ToolName> {
        match self {
            Self::Metadata => vec![ToolName::ExecuteSqlQuery],
            Self::Search => vec![
                ToolName::HybridSearch,
                ToolName::SearchByProject,
                ToolName::SearchSimilarDocuments,
                ToolName::SearchByDocument,
                ToolName::CompareFilteredDocuments,
            ],
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question and print the cited answer.
    ///
    /// Requires an OpenAI-compatible API key. The metadata agent needs
    /// `--db-path`; the search agent reads `CONTRACT_QA_OPENSEARCH_*`.
    #[command(after_help = r#"Examples:
  contract-qa --db-path contracts.db ask "How many Service Agreements expire in 2025?"
  contract-qa ask "What are the termination terms?" --agent search \
      --filters '{"documents":[{"project_id":"p1","reference_doc_id":"r1"}]}'
  contract-qa --format json ask "Total contract value by type?" --max-attempts 2
"#)]
    Ask {
        /// The question to answer.
        question: String,

        /// Agent to use.
        #[arg(short, long, value_enum, default_value_t = AgentKind::Metadata)]
        agent: AgentKind,

        /// Search filters as JSON.
        #[arg(long)]
        filters: Option<String>,

        /// JSON file with prior conversation messages.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Model calls allowed per attempt.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Attempts before giving up.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Token ceiling per attempt.
        #[arg(long)]
        token_budget: Option<u64>,

        /// Chat model override.
        #[arg(short, long)]
        model: Option<String>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// Run the SQL guardrail on a statement without executing it.
    #[command(after_help = r#"Examples:
  contract-qa check-sql "SELECT * FROM contract_asmd LIMIT 5000"
  contract-qa check-sql "SELECT * FROM contract_asmd" --inject-missing-limit
"#)]
    CheckSql {
        /// SQL statement to check.
        sql: String,

        /// Largest LIMIT allowed.
        #[arg(long, default_value_t = crate::agent::guardrail::DEFAULT_LIMIT_CEILING)]
        limit_ceiling: u64,

        /// Append a LIMIT instead of rejecting statements with no WHERE or LIMIT.
        #[arg(long)]
        inject_missing_limit: bool,
    },

    /// Print the schema of the metadata database.
    Schema,

    /// Print the tool schemas an agent advertises.
    Tools {
        /// Agent whose tools to print.
        #[arg(short, long, value_enum, default_value_t = AgentKind::Metadata)]
        agent: AgentKind,
    },

    /// Write default prompt templates for customization.
    InitPrompts {
        /// Target directory (default: ~/.config/contract-qa/prompts).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_arguments() {
        let cli = Cli::try_parse_from([
            "contract-qa",
            "--db-path",
            "contracts.db",
            "ask",
            "How many leases?",
            "--agent",
            "search",
            "--max-attempts",
            "2",
        ]);
        let Ok(cli) = cli else {
            unreachable!("parse failed: {cli:?}");
        };
        assert_eq!(cli.db_path, Some(PathBuf::from("contracts.db")));
        match cli.command {
            Commands::Ask {
                question,
                agent,
                max_attempts,
                max_iterations,
                ..
            } => {
                assert_eq!(question, "How many leases?");
                assert_eq!(agent, AgentKind::Search);
                assert_eq!(max_attempts, Some(2));
                assert_eq!(max_iterations, None);
            }
            other => unreachable!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_agent_tools() {
        assert_eq!(AgentKind::Metadata.tools(), vec![ToolName::ExecuteSqlQuery]);
        assert_eq!(AgentKind::Search.tools().len(), 5);
    }
}
