use crate::core::flow_graph::action::{ActionContext, ActionError, ActionHandler, ActionOutput};
use crate::core::flow_graph::model::{ActionParams, VarValue};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub const KIND: &str = "webhook";

const CONTROL_KEYS: [&str; 3] = ["url", "method", "store_as"];

/// Calls an external HTTP endpoint with the run's state.
///
/// Params: `url` (required), `method` (`POST` by default), `store_as`
/// (variable that receives the response body). Remaining params are sent in
/// the JSON body under `params`.
pub struct WebhookAction {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookAction {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn parse_url(params: &ActionParams) -> Result<Url, ActionError> {
        let raw = params
            .get("url")
            .and_then(VarValue::as_str)
            .ok_or_else(|| ActionError::MissingParameters {
                action: KIND.to_string(),
                missing: vec!["url".to_string()],
            })?;
        let url = Url::parse(raw.trim()).map_err(|err| ActionError::InvalidParameter {
            name: "url".to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ActionError::InvalidParameter {
                name: "url".to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    fn parse_method(params: &ActionParams) -> Result<Method, ActionError> {
        let Some(raw) = params.get("method") else {
            return Ok(Method::POST);
        };
        let invalid = || ActionError::InvalidParameter {
            name: "method".to_string(),
            reason: format!("expected GET, POST, PUT or PATCH, got '{}'", raw),
        };
        match raw.as_str().map(|m| m.trim().to_ascii_uppercase()).as_deref() {
            Some("GET") => Ok(Method::GET),
            Some("POST") => Ok(Method::POST),
            Some("PUT") => Ok(Method::PUT),
            Some("PATCH") => Ok(Method::PATCH),
            _ => Err(invalid()),
        }
    }
}

#[async_trait]
impl ActionHandler for WebhookAction {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn validate_params(&self, params: &ActionParams) -> Result<(), ActionError> {
        Self::parse_url(params)?;
        Self::parse_method(params)?;
        if let Some(store_as) = params.get("store_as") {
            if store_as.as_str().map(str::trim).unwrap_or_default().is_empty() {
                return Err(ActionError::InvalidParameter {
                    name: "store_as".to_string(),
                    reason: "must be a non-empty string".to_string(),
                });
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: ActionParams,
        ctx: ActionContext,
    ) -> Result<ActionOutput, ActionError> {
        self.validate_params(&params)?;
        let url = Self::parse_url(&params)?;
        let method = Self::parse_method(&params)?;
        let store_as = params
            .get("store_as")
            .and_then(VarValue::as_str)
            .map(|name| name.trim().to_string());

        let forwarded: ActionParams = params
            .iter()
            .filter(|(key, _)| !CONTROL_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let payload = json!({
            "flow_id": ctx.flow_id,
            "run_id": ctx.run_id,
            "node_id": ctx.node_id,
            "recipient": ctx.target.recipient,
            "params": forwarded,
            "variables": ctx.variables,
        });

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .timeout(self.timeout);
        if method != Method::GET {
            request = request.json(&payload);
        }

        tracing::debug!(url = %url, method = %method, node_id = %ctx.node_id, "calling webhook");
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ActionError::Failed(format!(
                    "webhook {} timed out after {}ms",
                    url,
                    self.timeout.as_millis()
                ))
            } else {
                ActionError::Failed(format!("webhook {} request failed: {}", url, err))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Failed(format!(
                "webhook {} returned status {}",
                url, status
            )));
        }

        let Some(store_as) = store_as else {
            return Ok(ActionOutput::empty());
        };
        let body = response
            .text()
            .await
            .map_err(|err| ActionError::Failed(format!("failed to read webhook response: {}", err)))?;
        Ok(ActionOutput::empty().with_variable(store_as, body.trim().to_string()))
    }
}
