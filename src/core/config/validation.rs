#![allow(clippy::result_large_err)]

use super::ChatflowConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &ChatflowConfig) -> Result<(), AppError> {
        if config.engine.max_steps == 0 {
            return Err(invalid("engine.max_steps must be >= 1"));
        }
        if config.channel.send_timeout_ms == 0 {
            return Err(invalid("channel.send_timeout_ms must be >= 1"));
        }
        if config.channel.media_timeout_ms == 0 {
            return Err(invalid("channel.media_timeout_ms must be >= 1"));
        }
        if config.webhook.timeout_ms == 0 {
            return Err(invalid("webhook.timeout_ms must be >= 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::new(ErrorCategory::ConfigError, "CFG-VALID-001", message)
}
