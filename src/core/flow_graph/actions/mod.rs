pub mod set_variable;
pub mod webhook;

use crate::core::flow_graph::action::ActionRegistryBuilder;
use std::time::Duration;

/// Register built-in action handlers into the supplied builder.
pub fn register_builtins(builder: &mut ActionRegistryBuilder, webhook_timeout: Duration) {
    builder
        .register(set_variable::SetVariableAction::new())
        .register(webhook::WebhookAction::new(webhook_timeout));
}
