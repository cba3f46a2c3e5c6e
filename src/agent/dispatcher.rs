//! Routes model tool calls through decoding, the guardrail and a handler.
//!
//! Every call produces exactly one [`ToolResult`]; nothing here returns
//! an error to the loop. Unknown names, undecodable arguments, guardrail
//! rejections, backend failures and timeouts all become failure results
//! the model can read and correct.

use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::guardrail::GuardrailPolicy;
use super::registry::ToolRegistry;
use super::tool::{ToolCall, ToolDefinition, ToolErrorKind, ToolInvocation, ToolResult};
use crate::core::SearchFilter;

/// Per-call execution limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Wall-clock limit for one handler invocation.
    pub timeout: Duration,
    /// Payload size cap in bytes.
    pub max_payload_bytes: usize,
}

impl DispatchLimits {
    /// Limits taken from configuration.
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self {
            timeout: config.tool_timeout,
            max_payload_bytes: config.max_tool_payload_bytes,
        }
    }
}

/// Executes tool calls for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    policy: &'a GuardrailPolicy,
    scope: &'a SearchFilter,
    limits: DispatchLimits,
}

impl<'a> ToolDispatcher<'a> {
    /// Dispatcher over `registry`, merging `scope` into every search.
    pub const fn new(
        registry: &'a ToolRegistry,
        policy: &'a GuardrailPolicy,
        scope: &'a SearchFilter,
        limits: DispatchLimits,
    ) -> Self {
        Self {
            registry,
            policy,
            scope,
            limits,
        }
    }

    /// Definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Executes one call.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(handler) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "unknown tool requested");
            return ToolResult::failure(
                &call.id,
                ToolErrorKind::UnknownTool,
                format!(
                    "unknown tool: {}; available tools: {}",
                    call.name,
                    self.registry.names().join(", ")
                ),
            );
        };

        let invocation = match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(invocation) => invocation,
            Err(message) => {
                debug!(tool = %call.name, %message, "undecodable tool arguments");
                return ToolResult::failure(&call.id, ToolErrorKind::InvalidArguments, message);
            }
        };

        let args = match self.policy.validate(invocation, self.scope) {
            Ok(args) => args,
            Err(violation) => {
                warn!(
                    tool = %call.name,
                    rule = %violation.rule,
                    detail = %violation.detail,
                    "guardrail rejected tool call"
                );
                return ToolResult::failure(
                    &call.id,
                    ToolErrorKind::GuardrailViolation,
                    format!("{}: {}", violation.rule, violation.detail),
                );
            }
        };

        match tokio::time::timeout(self.limits.timeout, handler.invoke(args)).await {
            Ok(Ok(payload)) => {
                let result = ToolResult::success(&call.id, payload, self.limits.max_payload_bytes);
                debug!(tool = %call.name, call_id = %call.id, "tool call succeeded");
                result
            }
            Ok(Err(failure)) => {
                warn!(tool = %call.name, error = failure.message(), "tool call failed");
                ToolResult::failure(&call.id, failure.kind(), failure.message())
            }
            Err(_) => {
                warn!(tool = %call.name, timeout = ?self.limits.timeout, "tool call timed out");
                ToolResult::failure(
                    &call.id,
                    ToolErrorKind::Backend,
                    format!("tool timed out after {}ms", self.limits.timeout.as_millis()),
                )
            }
        }
    }

    /// Executes all calls of one model response concurrently. Results
    /// come back in the order of `calls`.
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.dispatch(call))).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::agent::executor::{SqlQueryTool, search_tools};
    use crate::agent::guardrail::SanitizedArguments;
    use crate::agent::registry::{ToolFailure, ToolHandler};
    use crate::agent::testing::{StaticVectorStore, chunk, sample_sqlite};
    use crate::agent::tool::{ToolName, ToolOutcome};
    use crate::core::DocumentRef;
    use crate::store::VectorStore;

    const LIMITS: DispatchLimits = DispatchLimits {
        timeout: Duration::from_secs(5),
        max_payload_bytes: 10_000,
    };

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn sql_registry() -> ToolRegistry {
        ToolRegistry::new()
            .with(Arc::new(SqlQueryTool::new(Arc::new(sample_sqlite()), 50)))
            .unwrap_or_else(|e| panic!("registry failed: {e}"))
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = sql_registry();
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher.dispatch(&call("c1", "drop_everything", "{}")).await;
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert!(result.to_message_content().contains("execute_sql_query"));
    }

    #[tokio::test]
    async fn test_known_name_not_registered_is_unknown() {
        let registry = sql_registry();
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher
            .dispatch(&call("c1", "hybrid_search", r#"{"query":"x"}"#))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let registry = sql_registry();
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher
            .dispatch(&call("c1", "execute_sql_query", r#"{"sql": 5}"#))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn test_guardrail_blocks_before_handler() {
        let registry = sql_registry();
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher
            .dispatch(&call(
                "c1",
                "execute_sql_query",
                r#"{"query":"DELETE FROM contract_asmd WHERE 1=1"}"#,
            ))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::GuardrailViolation));
        assert!(result.to_message_content().contains("not_select"));
    }

    #[tokio::test]
    async fn test_sql_success_applies_limit() {
        let registry = sql_registry();
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher
            .dispatch(&call(
                "c1",
                "execute_sql_query",
                r#"{"query":"SELECT document_title FROM contract_asmd WHERE project_id = 'p1'","explanation":"p1 docs"}"#,
            ))
            .await;
        let ToolOutcome::Success { payload, truncated } = &result.outcome else {
            panic!("expected success, got {result:?}");
        };
        assert!(!truncated);
        let value: serde_json::Value =
            serde_json::from_str(payload).unwrap_or_else(|e| panic!("bad json: {e}"));
        assert_eq!(value["row_count"], 2);
        assert!(value["query"].as_str().unwrap_or_default().ends_with("LIMIT 1000"));
    }

    #[tokio::test]
    async fn test_scope_is_merged_into_search() {
        let store = Arc::new(StaticVectorStore::new(vec![
            chunk("p1", "r1", 1, "alpha"),
            chunk("p2", "r3", 1, "beta"),
        ]));
        let dyn_store: Arc<dyn VectorStore> = store.clone();
        let registry = search_tools(&dyn_store).unwrap_or_else(|e| panic!("registry failed: {e}"));
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter {
            documents: vec![DocumentRef::new("p1", "r1")],
            ..SearchFilter::default()
        };
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher
            .dispatch(&call("c1", "hybrid_search", r#"{"query":"anything"}"#))
            .await;
        assert!(result.is_success());
        let content = result.to_message_content();
        assert!(content.contains("alpha"));
        assert!(!content.contains("beta"));
        assert_eq!(store.requests()[0].filter.documents, scope.documents);
    }

    #[tokio::test]
    async fn test_payload_truncated() {
        let store = Arc::new(StaticVectorStore::new(vec![chunk(
            "p1",
            "r1",
            1,
            &"x".repeat(5_000),
        )]));
        let dyn_store: Arc<dyn VectorStore> = store;
        let registry = search_tools(&dyn_store).unwrap_or_else(|e| panic!("registry failed: {e}"));
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let limits = DispatchLimits {
            max_payload_bytes: 1_000,
            ..LIMITS
        };
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, limits);

        let result = dispatcher
            .dispatch(&call("c1", "hybrid_search", r#"{"query":"x"}"#))
            .await;
        assert!(matches!(
            result.outcome,
            ToolOutcome::Success {
                truncated: true,
                ..
            }
        ));
    }

    struct Stalled;

    #[async_trait]
    impl ToolHandler for Stalled {
        fn name(&self) -> ToolName {
            ToolName::HybridSearch
        }

        async fn invoke(&self, _args: SanitizedArguments) -> Result<String, ToolFailure> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_backend_failure() {
        let registry = ToolRegistry::new()
            .with(Arc::new(Stalled))
            .unwrap_or_else(|e| panic!("registry failed: {e}"));
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let result = dispatcher
            .dispatch(&call("c1", "hybrid_search", r#"{"query":"x"}"#))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Backend));
        assert!(result.to_message_content().contains("timed out"));
    }

    #[tokio::test]
    async fn test_dispatch_all_preserves_order() {
        let registry = sql_registry();
        let policy = GuardrailPolicy::default();
        let scope = SearchFilter::default();
        let dispatcher = ToolDispatcher::new(&registry, &policy, &scope, LIMITS);

        let calls = vec![
            call("a", "execute_sql_query", r#"{"query":"SELECT 1 LIMIT 1"}"#),
            call("b", "nope", "{}"),
            call("c", "execute_sql_query", r#"{"query":"UPDATE x SET y = 1"}"#),
        ];
        let results = dispatcher.dispatch_all(&calls).await;
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results[0].is_success());
        assert_eq!(results[1].error_kind(), Some(ToolErrorKind::UnknownTool));
        assert_eq!(results[2].error_kind(), Some(ToolErrorKind::GuardrailViolation));
    }
}
