use crate::core::flow_graph::context::RunTarget;
use crate::core::flow_graph::model::{ActionParams, VarValue, Variables};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("action '{action}' is missing parameter(s): {}", .missing.join(", "))]
    MissingParameters {
        action: String,
        missing: Vec<String>,
    },
    #[error("parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("action failed: {0}")]
    Failed(String),
}

/// Read-only view of the run handed to an action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: String,
    pub flow_id: String,
    pub node_id: String,
    pub target: RunTarget,
    pub variables: Variables,
}

/// Variables an action wants written back into the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub variables: Variables,
}

impl ActionOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Handler for one action kind.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Kind name used in action nodes.
    fn kind(&self) -> &'static str;

    /// Check params after template substitution, before execution.
    fn validate_params(&self, params: &ActionParams) -> Result<(), ActionError>;

    /// Execute with resolved params.
    async fn execute(
        &self,
        params: ActionParams,
        ctx: ActionContext,
    ) -> Result<ActionOutput, ActionError>;
}

/// Builder used to register action handlers before the engine starts.
pub struct ActionRegistryBuilder {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl Default for ActionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: ActionHandler>(&mut self, handler: T) -> &mut Self {
        let kind = handler.kind();
        if self.handlers.contains_key(kind) {
            panic!("duplicate action handler registered: {}", kind);
        }
        self.handlers.insert(kind.to_string(), Arc::new(handler));
        self
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            inner: Arc::new(self.handlers),
        }
    }
}

/// Immutable registry shared by all runs of an engine.
#[derive(Clone)]
pub struct ActionRegistry {
    inner: Arc<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistryBuilder::new().build()
    }

    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::new()
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.inner.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
