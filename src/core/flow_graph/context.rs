use crate::core::flow_graph::model::{VarValue, Variables};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient a run is executed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTarget {
    /// Messaging channel (connected instance) used for delivery.
    pub channel_id: String,
    /// Recipient identity, usually a phone number.
    pub recipient: String,
}

impl RunTarget {
    pub fn new(channel_id: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            recipient: recipient.into(),
        }
    }
}

/// Inbound event that started a run, exposed to the flow as built-in variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTrigger {
    pub keyword: Option<String>,
    pub message_text: Option<String>,
}

impl RunTrigger {
    pub fn keyword(keyword: impl Into<String>, message_text: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            message_text: Some(message_text.into()),
        }
    }
}

/// Mutable state owned by exactly one in-flight run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub flow_id: String,
    pub target: RunTarget,
    pub variables: Variables,
    pub current_node: Option<String>,
}

impl ExecutionContext {
    pub fn new(flow_id: impl Into<String>, target: RunTarget, variables: Variables) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            target,
            variables,
            current_node: None,
        }
    }

    /// Bind `phone`, `trigger_keyword` and `trigger_message` without replacing
    /// values the caller already supplied.
    pub fn bind_trigger(&mut self, trigger: &RunTrigger) {
        let recipient = self.target.recipient.clone();
        self.bind_default("phone", VarValue::Text(recipient));
        if let Some(keyword) = &trigger.keyword {
            self.bind_default("trigger_keyword", VarValue::Text(keyword.clone()));
        }
        if let Some(text) = &trigger.message_text {
            self.bind_default("trigger_message", VarValue::Text(text.clone()));
        }
    }

    fn bind_default(&mut self, name: &str, value: VarValue) {
        self.variables.entry(name.to_string()).or_insert(value);
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: VarValue) {
        self.variables.insert(name.into(), value);
    }

    /// Merge a variable patch produced by an action.
    pub fn apply_patch(&mut self, patch: Variables) {
        for (name, value) in patch {
            self.variables.insert(name, value);
        }
    }
}
