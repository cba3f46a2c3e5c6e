//! Named tool handlers available to an agent.
//!
//! A registry is built once per agent and never mutated while a turn
//! is running. Only handlers whose name maps to a known argument type
//! ([`ToolName`]) can be registered, so every advertised tool has a
//! decoder and a guardrail rule.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::guardrail::SanitizedArguments;
use super::tool::{ToolDefinition, ToolErrorKind, ToolName};
use crate::error::{AgentError, StoreError};

/// Why a handler could not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    /// Arguments passed the guardrail but violate a tool precondition.
    InvalidArguments(String),
    /// The backend failed.
    Backend(String),
}

impl ToolFailure {
    /// Matching [`ToolErrorKind`].
    pub const fn kind(&self) -> ToolErrorKind {
        match self {
            Self::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            Self::Backend(_) => ToolErrorKind::Backend,
        }
    }

    /// Message shown to the model.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArguments(m) | Self::Backend(m) => m,
        }
    }
}

impl From<StoreError> for ToolFailure {
    fn from(err: StoreError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A callable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name under which the handler is registered.
    fn name(&self) -> ToolName;

    /// Schema advertised to the model.
    fn definition(&self) -> ToolDefinition {
        self.name().definition()
    }

    /// Runs the tool on guardrail-approved arguments.
    async fn invoke(&self, args: SanitizedArguments) -> Result<String, ToolFailure>;
}

/// Ordered set of tool handlers with lookup by wire name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), AgentError> {
        let name = handler.name().as_str();
        if self.index.contains_key(name) {
            return Err(AgentError::DuplicateTool {
                name: name.to_string(),
            });
        }
        self.index.insert(name, self.handlers.len());
        self.handlers.push(handler);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateTool`] if the name is taken.
    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Result<Self, AgentError> {
        self.register(handler)?;
        Ok(self)
    }

    /// Looks up a handler by the name the model used.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.index.get(name).map(|&i| &self.handlers[i])
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.iter().map(|h| h.definition()).collect()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name().as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
