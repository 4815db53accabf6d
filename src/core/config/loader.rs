#![allow(clippy::result_large_err)]

use super::{ChatflowConfig, ConfigValidator};
use crate::core::error::AppError;
use crate::core::flow_graph::validator::ReachabilityPolicy;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/chatflow.toml)
    /// Environment variables override config file values
    /// A missing file yields defaults plus env overrides
    /// The merged result must pass ConfigValidator
    pub fn load_from_workspace(workspace_path: &Path) -> Result<ChatflowConfig, AppError> {
        let config_path = workspace_path.join("chatflow.toml");
        let config_file = Self::load_from_file(&config_path)?;

        let mut config = config_file.unwrap_or_default();

        Self::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<ChatflowConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::from(e)
                .with_code("CFG-LOAD-001")
                .with_context("path", path.display().to_string())
        })?;

        let config: ChatflowConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                "CFG-LOAD-002",
                format!("Failed to parse config file: {}", e),
            )
            .with_context("path", path.display().to_string())
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Environment variables take precedence over config file values
    fn apply_env_overrides(config: &mut ChatflowConfig) -> Result<(), AppError> {
        if let Some(max_steps) = parse_env::<usize>("CHATFLOW_ENGINE_MAX_STEPS")? {
            config.engine.max_steps = max_steps;
        }

        if let Some(allow) = parse_env::<bool>("CHATFLOW_ENGINE_ALLOW_REVISITS")? {
            config.engine.allow_revisits = allow;
        }

        if let Some(validate) = parse_env::<bool>("CHATFLOW_ENGINE_VALIDATE_BEFORE_RUN")? {
            config.engine.validate_before_run = validate;
        }

        if let Ok(policy) = env::var("CHATFLOW_ENGINE_REACHABILITY") {
            config.engine.reachability = policy.parse::<ReachabilityPolicy>().map_err(|e| {
                AppError::new(ErrorCategory::ConfigError, "CFG-ENV-001", e)
            })?;
        }

        if let Some(timeout) = parse_env::<u64>("CHATFLOW_CHANNEL_SEND_TIMEOUT_MS")? {
            config.channel.send_timeout_ms = timeout;
        }

        if let Some(timeout) = parse_env::<u64>("CHATFLOW_CHANNEL_MEDIA_TIMEOUT_MS")? {
            config.channel.media_timeout_ms = timeout;
        }

        if let Some(timeout) = parse_env::<u64>("CHATFLOW_WEBHOOK_TIMEOUT_MS")? {
            config.webhook.timeout_ms = timeout;
        }

        Ok(())
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "CHATFLOW_ENGINE_MAX_STEPS - Override the per-run node execution cap (default: 256)",
            "CHATFLOW_ENGINE_ALLOW_REVISITS - Allow a run to enter a node twice (true/false, default: false)",
            "CHATFLOW_ENGINE_VALIDATE_BEFORE_RUN - Validate flows before each run (true/false, default: true)",
            "CHATFLOW_ENGINE_REACHABILITY - End node reachability policy (all/any, default: all)",
            "CHATFLOW_CHANNEL_SEND_TIMEOUT_MS - Timeout for channel sends (default: 15000)",
            "CHATFLOW_CHANNEL_MEDIA_TIMEOUT_MS - Timeout for media resolution (default: 10000)",
            "CHATFLOW_WEBHOOK_TIMEOUT_MS - Timeout for webhook actions (default: 10000)",
        ]
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, AppError> {
    let Ok(raw) = env::var(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        AppError::new(
            ErrorCategory::ConfigError,
            "CFG-ENV-001",
            format!("environment variable {} has invalid value '{}'", key, raw),
        )
    })
}
