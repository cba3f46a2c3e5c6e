//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::guardrail::{DEFAULT_LIMIT_CEILING, MissingScopePolicy};
use crate::error::AgentError;

/// Default chat model.
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
/// Default embedding model for hybrid search.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default max tokens per completion.
const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default LLM request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default model/tool round-trips per attempt.
const DEFAULT_MAX_ITERATIONS: usize = 5;
/// Default whole-turn attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default token ceiling per attempt.
const DEFAULT_TOKEN_BUDGET: u64 = 100_000;
/// Default first retry delay.
const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
/// Default longest retry delay.
const DEFAULT_BACKOFF_CAP_MS: u64 = 10_000;
/// Default per-tool-call timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
/// Default cap on a tool payload sent back to the model.
const DEFAULT_MAX_TOOL_PAYLOAD_BYTES: usize = 32_000;
/// Default rows returned by one SQL call.
const DEFAULT_SQL_ROW_CAP: usize = 1_000;
/// Default passages per search.
const DEFAULT_SEARCH_TOP_K: usize = 10;
/// Default largest passages per search.
const DEFAULT_MAX_SEARCH_TOP_K: usize = 50;

/// Configuration for the agent engine.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Chat model.
    pub model: String,
    /// Embedding model used for hybrid search queries.
    pub embedding_model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// LLM request timeout.
    pub timeout: Duration,
    /// Model/tool round-trips allowed per attempt.
    pub max_iterations: usize,
    /// Whole-turn attempts before giving up.
    pub max_attempts: u32,
    /// Token ceiling per attempt; `None` disables the check.
    pub token_budget: Option<u64>,
    /// Delay before the second attempt; doubles per attempt.
    pub backoff_base: Duration,
    /// Longest delay between attempts.
    pub backoff_cap: Duration,
    /// Timeout for a single tool call.
    pub tool_timeout: Duration,
    /// Largest tool payload returned to the model, in bytes.
    pub max_tool_payload_bytes: usize,
    /// Ceiling applied to SQL `LIMIT`.
    pub sql_limit_ceiling: u64,
    /// Rows read from the store per SQL call.
    pub sql_row_cap: usize,
    /// Handling of SQL with neither `WHERE` nor `LIMIT`.
    pub missing_scope_policy: MissingScopePolicy,
    /// Default passages per search.
    pub search_top_k: usize,
    /// Largest passages per search.
    pub max_search_top_k: usize,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_iterations: Option<usize>,
    max_attempts: Option<u32>,
    token_budget: Option<Option<u64>>,
    backoff_base: Option<Duration>,
    backoff_cap: Option<Duration>,
    tool_timeout: Option<Duration>,
    max_tool_payload_bytes: Option<usize>,
    sql_limit_ceiling: Option<u64>,
    sql_row_cap: Option<usize>,
    missing_scope_policy: Option<MissingScopePolicy>,
    search_top_k: Option<usize>,
    max_search_top_k: Option<usize>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CONTRACT_QA_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("CONTRACT_QA_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("CONTRACT_QA_BASE_URL"))
                .ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("CONTRACT_QA_MODEL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("CONTRACT_QA_EMBEDDING_MODEL").ok();
        }
        if self.max_tokens.is_none() {
            self.max_tokens = env_parse("CONTRACT_QA_MAX_TOKENS");
        }
        if self.timeout.is_none() {
            self.timeout = env_parse("CONTRACT_QA_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse("CONTRACT_QA_MAX_ITERATIONS");
        }
        if self.max_attempts.is_none() {
            self.max_attempts = env_parse("CONTRACT_QA_MAX_ATTEMPTS");
        }
        if self.token_budget.is_none() {
            self.token_budget = env_parse::<u64>("CONTRACT_QA_TOKEN_BUDGET")
                .map(|n| if n == 0 { None } else { Some(n) });
        }
        if self.backoff_base.is_none() {
            self.backoff_base = env_parse("CONTRACT_QA_BACKOFF_BASE_MS").map(Duration::from_millis);
        }
        if self.backoff_cap.is_none() {
            self.backoff_cap = env_parse("CONTRACT_QA_BACKOFF_CAP_MS").map(Duration::from_millis);
        }
        if self.tool_timeout.is_none() {
            self.tool_timeout = env_parse("CONTRACT_QA_TOOL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.max_tool_payload_bytes.is_none() {
            self.max_tool_payload_bytes = env_parse("CONTRACT_QA_MAX_TOOL_PAYLOAD_BYTES");
        }
        if self.sql_limit_ceiling.is_none() {
            self.sql_limit_ceiling = env_parse("CONTRACT_QA_SQL_LIMIT_CEILING");
        }
        if self.sql_row_cap.is_none() {
            self.sql_row_cap = env_parse("CONTRACT_QA_SQL_ROW_CAP");
        }
        if self.missing_scope_policy.is_none() {
            self.missing_scope_policy = std::env::var("CONTRACT_QA_SQL_MISSING_SCOPE")
                .ok()
                .and_then(|v| MissingScopePolicy::parse(&v));
        }
        if self.search_top_k.is_none() {
            self.search_top_k = env_parse("CONTRACT_QA_SEARCH_TOP_K");
        }
        if self.max_search_top_k.is_none() {
            self.max_search_top_k = env_parse("CONTRACT_QA_MAX_SEARCH_TOP_K");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("CONTRACT_QA_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the max tokens per completion.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the LLM request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Sets the token ceiling; `None` disables it.
    #[must_use]
    pub const fn token_budget(mut self, budget: Option<u64>) -> Self {
        self.token_budget = Some(budget);
        self
    }

    /// Sets the retry backoff base and cap.
    #[must_use]
    pub const fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = Some(base);
        self.backoff_cap = Some(cap);
        self
    }

    /// Sets the per-tool-call timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, duration: Duration) -> Self {
        self.tool_timeout = Some(duration);
        self
    }

    /// Sets the tool payload cap.
    #[must_use]
    pub const fn max_tool_payload_bytes(mut self, n: usize) -> Self {
        self.max_tool_payload_bytes = Some(n);
        self
    }

    /// Sets the SQL `LIMIT` ceiling.
    #[must_use]
    pub const fn sql_limit_ceiling(mut self, n: u64) -> Self {
        self.sql_limit_ceiling = Some(n);
        self
    }

    /// Sets the SQL row cap.
    #[must_use]
    pub const fn sql_row_cap(mut self, n: usize) -> Self {
        self.sql_row_cap = Some(n);
        self
    }

    /// Sets the policy for SQL without `WHERE` or `LIMIT`.
    #[must_use]
    pub const fn missing_scope_policy(mut self, policy: MissingScopePolicy) -> Self {
        self.missing_scope_policy = Some(policy);
        self
    }

    /// Sets the default and largest search `top_k`.
    #[must_use]
    pub const fn search_top_k(mut self, default: usize, max: usize) -> Self {
        self.search_top_k = Some(default);
        self.max_search_top_k = Some(max);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, or
    /// [`AgentError::InvalidConfig`] for inconsistent budgets.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let config = AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(0.0),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            token_budget: self.token_budget.unwrap_or(Some(DEFAULT_TOKEN_BUDGET)),
            backoff_base: self
                .backoff_base
                .unwrap_or(Duration::from_millis(DEFAULT_BACKOFF_BASE_MS)),
            backoff_cap: self
                .backoff_cap
                .unwrap_or(Duration::from_millis(DEFAULT_BACKOFF_CAP_MS)),
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            max_tool_payload_bytes: self
                .max_tool_payload_bytes
                .unwrap_or(DEFAULT_MAX_TOOL_PAYLOAD_BYTES),
            sql_limit_ceiling: self.sql_limit_ceiling.unwrap_or(DEFAULT_LIMIT_CEILING),
            sql_row_cap: self.sql_row_cap.unwrap_or(DEFAULT_SQL_ROW_CAP),
            missing_scope_policy: self
                .missing_scope_policy
                .unwrap_or(MissingScopePolicy::DEFAULT),
            search_top_k: self.search_top_k.unwrap_or(DEFAULT_SEARCH_TOP_K),
            max_search_top_k: self.max_search_top_k.unwrap_or(DEFAULT_MAX_SEARCH_TOP_K),
            prompt_dir: self.prompt_dir,
        };

        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &AgentConfig) -> Result<(), AgentError> {
    let invalid = |message: &str| {
        Err(AgentError::InvalidConfig {
            message: message.to_string(),
        })
    };
    if config.max_iterations == 0 {
        return invalid("max_iterations must be at least 1");
    }
    if config.max_attempts == 0 {
        return invalid("max_attempts must be at least 1");
    }
    if config.backoff_base > config.backoff_cap {
        return invalid("backoff base must not exceed backoff cap");
    }
    if config.sql_limit_ceiling == 0 || config.sql_row_cap == 0 {
        return invalid("SQL limit ceiling and row cap must be at least 1");
    }
    if config.search_top_k == 0 || config.search_top_k > config.max_search_top_k {
        return invalid("search top_k must be between 1 and the maximum");
    }
    if config.max_tool_payload_bytes == 0 {
        return invalid("tool payload cap must be at least 1 byte");
    }
    Ok(())
}
