use crate::core::flow_graph::validator::ReachabilityPolicy;
use serde::{Deserialize, Serialize};

/// Main chatflow configuration loaded from chatflow.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatflowConfig {
    /// Execution engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Messaging channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Webhook action configuration
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on node executions per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Allow a run to enter the same node twice
    #[serde(default)]
    pub allow_revisits: bool,

    /// Validate the flow before every execution
    #[serde(default = "default_validate_before_run")]
    pub validate_before_run: bool,

    /// Which end nodes must be reachable from start
    #[serde(default)]
    pub reachability: ReachabilityPolicy,
}

/// Messaging channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Upper bound for a single send call
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Upper bound for resolving a media reference
    #[serde(default = "default_media_timeout_ms")]
    pub media_timeout_ms: u64,
}

/// Webhook action configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Upper bound for the outbound HTTP call
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_steps() -> usize {
    256
}

fn default_validate_before_run() -> bool {
    true
}

fn default_send_timeout_ms() -> u64 {
    15_000
}

fn default_media_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps: default_max_steps(),
            allow_revisits: false,
            validate_before_run: default_validate_before_run(),
            reachability: ReachabilityPolicy::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            send_timeout_ms: default_send_timeout_ms(),
            media_timeout_ms: default_media_timeout_ms(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
