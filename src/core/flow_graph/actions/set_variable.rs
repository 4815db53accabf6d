use crate::core::flow_graph::action::{ActionContext, ActionError, ActionHandler, ActionOutput};
use crate::core::flow_graph::model::ActionParams;
use async_trait::async_trait;

pub const KIND: &str = "set_variable";

/// Writes `{name, value}` into the run's variable bag.
pub struct SetVariableAction;

impl Default for SetVariableAction {
    fn default() -> Self {
        Self::new()
    }
}

impl SetVariableAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionHandler for SetVariableAction {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn validate_params(&self, params: &ActionParams) -> Result<(), ActionError> {
        let missing: Vec<String> = ["name", "value"]
            .iter()
            .filter(|key| !params.contains_key(**key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ActionError::MissingParameters {
                action: KIND.to_string(),
                missing,
            });
        }
        match params.get("name").and_then(|name| name.as_str()) {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(ActionError::InvalidParameter {
                name: "name".to_string(),
                reason: "must be a non-empty string".to_string(),
            }),
        }
    }

    async fn execute(
        &self,
        params: ActionParams,
        _ctx: ActionContext,
    ) -> Result<ActionOutput, ActionError> {
        self.validate_params(&params)?;
        let name = params
            .get("name")
            .and_then(|name| name.as_str())
            .map(|name| name.trim().to_string())
            .unwrap_or_default();
        let value = params
            .get("value")
            .cloned()
            .ok_or_else(|| ActionError::MissingParameters {
                action: KIND.to_string(),
                missing: vec!["value".to_string()],
            })?;
        Ok(ActionOutput::empty().with_variable(name, value))
    }
}
