//! Agentic tool-calling loop.
//!
//! Drives the model ↔ tool round-trip for one attempt: send the message
//! log, dispatch any tool calls, append their results in request order,
//! and repeat until the model answers without tool calls or a budget
//! runs out. The message log is owned by the loop and dropped with it.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::dispatcher::ToolDispatcher;
use super::message::{
    ChatMessage, ChatRequest, TokenUsage, UsageMeter, assistant_tool_calls_message, tool_message,
};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Budgets for one pass of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Maximum model calls.
    pub max_iterations: usize,
    /// Ceiling on cumulative tokens, if any.
    pub token_budget: Option<u64>,
}

/// Result of a loop pass that ended with a final answer.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Raw final answer text, not yet validated.
    pub content: String,
    /// Tokens used across all iterations.
    pub usage: TokenUsage,
    /// Model calls made.
    pub iterations: usize,
    /// Full message log, including tool calls and results.
    pub messages: Vec<ChatMessage>,
}

/// Runs the loop: model → tool calls → tool results → model → …
///
/// Every model response is also recorded in `meter`, so usage of a pass
/// that ends in an error is still counted by the caller.
///
/// # Errors
///
/// - [`AgentError::IterationBudgetExceeded`] if the model still wants
///   tools after `max_iterations` calls.
/// - [`AgentError::TokenBudgetExceeded`] once cumulative usage passes
///   the budget.
/// - [`AgentError::Cancelled`] if `cancel` fires during a model call or
///   tool dispatch.
/// - Provider errors unchanged.
pub async fn agentic_loop(
    provider: &dyn LlmProvider,
    mut request: ChatRequest,
    dispatcher: &ToolDispatcher<'_>,
    limits: LoopLimits,
    meter: &UsageMeter,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, AgentError> {
    let mut usage = TokenUsage::default();

    for iteration in 1..=limits.max_iterations {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            response = provider.chat(&request) => response?,
        };

        usage.accumulate(response.usage);
        meter.record(response.usage);
        debug!(
            iteration,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            total_tokens = usage.total(),
            tool_calls = response.tool_calls.len(),
            "model responded"
        );
        if let Some(budget) = limits.token_budget
            && usage.total() > budget
        {
            return Err(AgentError::TokenBudgetExceeded {
                used: usage.total(),
                budget,
            });
        }

        if response.tool_calls.is_empty() {
            return Ok(LoopOutcome {
                content: response.content,
                usage,
                iterations: iteration,
                messages: request.messages,
            });
        }

        let results = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            results = dispatcher.dispatch_all(&response.tool_calls) => results,
        };

        request.messages.push(assistant_tool_calls_message(
            response.content,
            response.tool_calls,
        ));
        for result in &results {
            request
                .messages
                .push(tool_message(&result.call_id, &result.to_message_content()));
        }
        debug!(
            iteration,
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "tool results appended"
        );
    }

    Err(AgentError::IterationBudgetExceeded {
        max_iterations: limits.max_iterations,
    })
}
