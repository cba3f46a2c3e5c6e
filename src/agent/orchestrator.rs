//! Turn orchestration.
//!
//! [`Orchestrator::run_turn`] is the one entry point callers use: it
//! validates the request, seeds the message log, and runs
//! loop-then-validate attempts under the retry controller. Every
//! outcome is either a [`TurnReport`] holding a validated answer or a
//! [`TurnError`].

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::agentic_loop::{LoopLimits, agentic_loop};
use super::answer::{AnswerEnvelope, AnswerValidator};
use super::config::AgentConfig;
use super::dispatcher::{DispatchLimits, ToolDispatcher};
use super::guardrail::GuardrailPolicy;
use super::message::{
    ChatMessage, Role, TokenUsage, UsageMeter, system_message, user_message,
};
use super::provider::LlmProvider;
use super::retry::{RetryController, RetryPolicy};
use super::traits::Agent;
use crate::core::SearchFilter;
use crate::error::{AgentError, TurnError};

/// Longest accepted question, in bytes.
const MAX_QUESTION_LEN: usize = 10_000;

/// Per-turn overrides of the configured budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TurnConstraints {
    /// Model calls allowed per attempt.
    pub max_iterations: Option<usize>,
    /// Attempts allowed per turn.
    pub max_attempts: Option<u32>,
    /// Token ceiling per attempt.
    pub token_budget: Option<u64>,
}

/// One question from the caller.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// The user's question.
    pub question: String,
    /// Prior conversation, oldest first.
    pub history: Vec<ChatMessage>,
    /// Search scope applied to every search call.
    pub filters: SearchFilter,
    /// Budget overrides.
    pub constraints: TurnConstraints,
}

impl TurnRequest {
    /// Request with no history, filters or overrides.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

/// A successful turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    /// The validated answer.
    pub envelope: AnswerEnvelope,
    /// Tokens used by the successful attempt.
    pub usage: TokenUsage,
    /// Tokens used by every attempt, failed ones included.
    pub total_usage: TokenUsage,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Model calls in the successful attempt.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy)]
struct Budgets {
    loop_limits: LoopLimits,
    max_attempts: u32,
}

/// Runs turns for one agent.
///
/// The agent, its registry and the guardrail policy are shared read-only
/// by every turn; each turn owns its own message log and counters.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    agent: Arc<dyn Agent>,
    policy: GuardrailPolicy,
    validator: AnswerValidator,
    config: AgentConfig,
}

impl Orchestrator {
    /// Creates an orchestrator for `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if the answer validator
    /// cannot be built.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        agent: Arc<dyn Agent>,
        config: AgentConfig,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            provider,
            agent,
            policy: GuardrailPolicy::from_config(&config),
            validator: AnswerValidator::new()?,
            config,
        })
    }

    /// The agent this orchestrator drives.
    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    /// The active guardrail policy.
    pub const fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    /// Answers one question.
    ///
    /// Malformed requests fail with [`TurnError::Rejected`] before any
    /// model call. Cancelling `cancel` aborts the in-flight model call or
    /// tool dispatch and returns [`TurnError::Cancelled`].
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnReport, TurnError> {
        let budgets = self
            .budgets(&request)
            .map_err(|e| TurnError::Rejected {
                attempts: 0,
                reason: e.to_string(),
            })?;

        let start = Instant::now();
        let seed = self.seed_messages(&request);
        let dispatcher = ToolDispatcher::new(
            self.agent.registry(),
            &self.policy,
            &request.filters,
            DispatchLimits::from_config(&self.config),
        );
        let dispatcher = &dispatcher;
        let retry = RetryController::new(RetryPolicy {
            max_attempts: budgets.max_attempts,
            ..RetryPolicy::from_config(&self.config)
        });

        info!(
            agent = self.agent.name(),
            history = request.history.len(),
            filtered = !request.filters.is_empty(),
            "turn started"
        );

        let meter = UsageMeter::default();
        let meter = &meter;
        let ((envelope, usage, iterations), attempts) = retry
            .execute(cancel, |attempt| {
                let messages = seed.clone();
                async move {
                    debug!(attempt, "attempt started");
                    let outcome = agentic_loop(
                        self.provider.as_ref(),
                        self.agent.request(messages),
                        dispatcher,
                        budgets.loop_limits,
                        meter,
                        cancel,
                    )
                    .await?;
                    match self.validator.validate(&outcome.content) {
                        Ok(envelope) => Ok((envelope, outcome.usage, outcome.iterations)),
                        Err(e) => {
                            warn!(attempt, reason = %e, "answer rejected");
                            debug!(content = %outcome.content, "rejected answer");
                            Err(AgentError::Validation(e))
                        }
                    }
                }
            })
            .await
            .map_err(|e| e.with_usage(meter.snapshot()))?;
        let total_usage = meter.snapshot();

        info!(
            agent = self.agent.name(),
            attempts,
            iterations,
            total_tokens = total_usage.total(),
            citations = envelope.citations.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "turn completed"
        );

        Ok(TurnReport {
            envelope,
            usage,
            total_usage,
            attempts,
            iterations,
        })
    }

    /// Checks the request and resolves its budgets.
    fn budgets(&self, request: &TurnRequest) -> Result<Budgets, AgentError> {
        let invalid = |message: String| AgentError::InvalidRequest { message };

        if request.question.trim().is_empty() {
            return Err(invalid("question is empty".to_string()));
        }
        if request.question.len() > MAX_QUESTION_LEN {
            return Err(invalid(format!(
                "question is {} bytes, max {MAX_QUESTION_LEN}",
                request.question.len()
            )));
        }
        if let Some(pos) = request.history.iter().position(|m| m.role == Role::System) {
            return Err(invalid(format!(
                "history message {pos} has the system role"
            )));
        }
        if let Some(pos) = request
            .history
            .iter()
            .position(|m| m.role == Role::Tool && m.tool_call_id.is_none())
        {
            return Err(invalid(format!(
                "history tool message {pos} has no tool_call_id"
            )));
        }

        let constraints = request.constraints;
        let max_iterations = constraints
            .max_iterations
            .unwrap_or(self.config.max_iterations);
        let max_attempts = constraints.max_attempts.unwrap_or(self.config.max_attempts);
        let token_budget = constraints.token_budget.or(self.config.token_budget);
        if max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1".to_string()));
        }
        if max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1".to_string()));
        }
        if token_budget == Some(0) {
            return Err(invalid("token_budget must be positive".to_string()));
        }

        Ok(Budgets {
            loop_limits: LoopLimits {
                max_iterations,
                token_budget,
            },
            max_attempts,
        })
    }

    /// System prompt, filter context, history, then the question.
    fn seed_messages(&self, request: &TurnRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 3);
        messages.push(system_message(self.agent.system_prompt()));
        if let Some(context) = request.filters.describe() {
            messages.push(system_message(&context));
        }
        messages.extend(request.history.iter().cloned());
        messages.push(user_message(request.question.trim()));
        messages
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("agent", &self.agent.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
