//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Async work runs on
//! a tokio runtime created per command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent::guardrail::{MissingScopePolicy, SqlPolicy};
use crate::agent::{
    Agent, AgentConfig, ChatMessage, ContractSearchAgent, MetadataAgent, Orchestrator, PromptSet,
    TurnConstraints, TurnRequest, create_provider,
};
use crate::cli::output::{OutputFormat, format_report, format_tools};
use crate::cli::parser::{AgentKind, Cli, Commands};
use crate::core::SearchFilter;
use crate::error::{CommandError, Result};
use crate::store::{RelationalStore, SqliteStore, VectorStore};

/// Parameters for the ask command.
#[derive(Debug, Clone, Default)]
pub struct AskParams<'a> {
    /// The question.
    pub question: &'a str,
    /// Agent to use.
    pub agent: AgentKind,
    /// Search filters as JSON.
    pub filters: Option<&'a str>,
    /// History file.
    pub history: Option<&'a Path>,
    /// Budget overrides.
    pub constraints: TurnConstraints,
    /// Chat model override.
    pub model: Option<&'a str>,
    /// Prompt directory override.
    pub prompt_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.db_path.as_deref();

    match &cli.command {
        Commands::Ask {
            question,
            agent,
            filters,
            history,
            max_iterations,
            max_attempts,
            token_budget,
            model,
            prompt_dir,
        } => {
            let params = AskParams {
                question,
                agent: *agent,
                filters: filters.as_deref(),
                history: history.as_deref(),
                constraints: TurnConstraints {
                    max_iterations: *max_iterations,
                    max_attempts: *max_attempts,
                    token_budget: *token_budget,
                },
                model: model.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_ask(db_path, &params, format)
        }
        Commands::CheckSql {
            sql,
            limit_ceiling,
            inject_missing_limit,
        } => cmd_check_sql(sql, *limit_ceiling, *inject_missing_limit, format),
        Commands::Schema => cmd_schema(db_path, format),
        Commands::Tools { agent } => Ok(cmd_tools(*agent, format)),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn open_sqlite(db_path: Option<&Path>) -> Result<SqliteStore> {
    let path = db_path.ok_or_else(|| {
        CommandError::InvalidArgument(
            "metadata database required: pass --db-path or set CONTRACT_QA_DB_PATH".to_string(),
        )
    })?;
    if !path.exists() {
        return Err(CommandError::InvalidArgument(format!(
            "database not found: {}",
            path.display()
        ))
        .into());
    }
    Ok(SqliteStore::open(path)?)
}

#[cfg(feature = "opensearch")]
fn open_vector_store(config: &AgentConfig) -> Result<Arc<dyn VectorStore>> {
    use crate::store::{Embedder, OpenAiEmbedder, OpenSearchConfig, OpenSearchStore};

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(config));
    let store = OpenSearchStore::new(OpenSearchConfig::from_env(), Some(embedder))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "opensearch"))]
fn open_vector_store(_config: &AgentConfig) -> Result<Arc<dyn VectorStore>> {
    Err(CommandError::ExecutionFailed(
        "search agent unavailable: built without the `opensearch` feature".to_string(),
    )
    .into())
}

fn parse_filters(raw: Option<&str>) -> Result<SearchFilter> {
    raw.map_or_else(
        || Ok(SearchFilter::default()),
        |json| {
            serde_json::from_str(json).map_err(|e| {
                CommandError::InvalidArgument(format!("--filters is not a valid filter: {e}"))
                    .into()
            })
        },
    )
}

fn read_history(path: Option<&Path>) -> Result<Vec<ChatMessage>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        CommandError::InvalidArgument(format!(
            "history file {} is not a message array: {e}",
            path.display()
        ))
        .into()
    })
}

fn cmd_ask(db_path: Option<&Path>, params: &AskParams<'_>, format: OutputFormat) -> Result<String> {
    let filters = parse_filters(params.filters)?;
    let history = read_history(params.history)?;

    let mut builder = AgentConfig::builder().from_env();
    if let Some(model) = params.model {
        builder = builder.model(model);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.build()?;
    let prompts = PromptSet::load(config.prompt_dir.as_deref());
    let provider = create_provider(&config)?;

    let rt = runtime()?;
    let report = rt.block_on(async move {
        let agent: Arc<dyn Agent> = match params.agent {
            AgentKind::Metadata => {
                let store: Arc<dyn RelationalStore> = Arc::new(open_sqlite(db_path)?);
                Arc::new(MetadataAgent::new(&config, &prompts, store).await?)
            }
            AgentKind::Search => {
                let store = open_vector_store(&config)?;
                Arc::new(ContractSearchAgent::new(&config, &prompts, &store)?)
            }
        };
        let orchestrator = Orchestrator::new(provider, agent, config)?;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling turn");
                trigger.cancel();
            }
        });

        let request = TurnRequest {
            question: params.question.to_string(),
            history,
            filters,
            constraints: params.constraints,
        };
        let result = orchestrator.run_turn(request, &cancel).await;
        watcher.abort();
        Ok::<_, crate::error::Error>(result?)
    })?;

    Ok(match format {
        OutputFormat::Text => format_report(&report),
        OutputFormat::Json => format.to_json(&report),
    })
}

fn cmd_check_sql(
    sql: &str,
    limit_ceiling: u64,
    inject_missing_limit: bool,
    format: OutputFormat,
) -> Result<String> {
    let policy = SqlPolicy {
        limit_ceiling,
        missing_scope: if inject_missing_limit {
            MissingScopePolicy::InjectLimit
        } else {
            MissingScopePolicy::Reject
        },
        ..SqlPolicy::default()
    };

    match (policy.sanitize(sql), format) {
        (Ok(rewritten), OutputFormat::Text) => Ok(format!("accepted\n{rewritten}\n")),
        (Ok(rewritten), OutputFormat::Json) => Ok(format.to_json(&serde_json::json!({
            "accepted": true,
            "query": rewritten,
            "rewritten": rewritten != sql.trim(),
        }))),
        (Err(violation), _) => Err(CommandError::ExecutionFailed(format!(
            "rejected ({}): {}",
            violation.rule, violation.detail
        ))
        .into()),
    }
}

fn cmd_schema(db_path: Option<&Path>, format: OutputFormat) -> Result<String> {
    let store = open_sqlite(db_path)?;
    let schema = runtime()?.block_on(store.describe_schema())?;
    Ok(match format {
        OutputFormat::Text => schema,
        OutputFormat::Json => format.to_json(&serde_json::json!({ "schema": schema })),
    })
}

fn cmd_tools(agent: AgentKind, format: OutputFormat) -> String {
    let definitions: Vec<_> = agent.tools().into_iter().map(|t| t.definition()).collect();
    match format {
        OutputFormat::Text => format_tools(&definitions),
        OutputFormat::Json => format.to_json(&definitions),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown"),
                );
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "directory": target_dir.to_string_lossy(),
            "written": written
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            "count": written.len(),
        }))),
    }
}
