use chatflow::core::config::{ConfigLoader, ConfigValidator};
use chatflow::core::flow_graph::{EngineSettings, ReachabilityPolicy};
use chatflow::core::types::ErrorCategory;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const CHATFLOW_ENV: [&str; 7] = [
    "CHATFLOW_ENGINE_MAX_STEPS",
    "CHATFLOW_ENGINE_ALLOW_REVISITS",
    "CHATFLOW_ENGINE_VALIDATE_BEFORE_RUN",
    "CHATFLOW_ENGINE_REACHABILITY",
    "CHATFLOW_CHANNEL_SEND_TIMEOUT_MS",
    "CHATFLOW_CHANNEL_MEDIA_TIMEOUT_MS",
    "CHATFLOW_WEBHOOK_TIMEOUT_MS",
];

fn clear_chatflow_env() {
    for key in CHATFLOW_ENV {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn missing_file_yields_defaults() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();

    assert_eq!(config.engine.max_steps, 256);
    assert!(config.engine.validate_before_run);
    assert_eq!(config.engine.reachability, ReachabilityPolicy::All);
    assert!(ConfigValidator::validate(&config).is_ok());
}

#[test]
#[serial]
fn workspace_file_is_loaded() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("chatflow.toml"),
        r#"
[engine]
max_steps = 40
allow_revisits = true
reachability = "any"

[channel]
send_timeout_ms = 3000
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();

    assert_eq!(config.engine.max_steps, 40);
    assert!(config.engine.allow_revisits);
    assert_eq!(config.engine.reachability, ReachabilityPolicy::Any);
    assert_eq!(config.channel.send_timeout_ms, 3000);
    assert_eq!(config.channel.media_timeout_ms, 10_000);

    let settings = EngineSettings::from(&config);
    assert_eq!(settings.max_steps, 40);
    assert_eq!(settings.send_timeout, Duration::from_secs(3));
}

#[test]
#[serial]
fn env_overrides_take_precedence_over_file() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("chatflow.toml"),
        "[engine]\nmax_steps = 40\n\n[webhook]\ntimeout_ms = 2500\n",
    )
    .unwrap();
    env::set_var("CHATFLOW_ENGINE_MAX_STEPS", "12");
    env::set_var("CHATFLOW_ENGINE_REACHABILITY", " ANY ");
    env::set_var("CHATFLOW_ENGINE_VALIDATE_BEFORE_RUN", "false");

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    clear_chatflow_env();

    assert_eq!(config.engine.max_steps, 12);
    assert_eq!(config.engine.reachability, ReachabilityPolicy::Any);
    assert!(!config.engine.validate_before_run);
    assert_eq!(config.webhook.timeout_ms, 2500);
}

#[test]
#[serial]
fn invalid_env_value_is_a_config_error() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("CHATFLOW_CHANNEL_SEND_TIMEOUT_MS", "soon");

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    clear_chatflow_env();

    assert_eq!(err.code, "CFG-ENV-001");
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert!(err.message.contains("CHATFLOW_CHANNEL_SEND_TIMEOUT_MS"));
}

#[test]
#[serial]
fn malformed_file_is_a_parse_error() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("chatflow.toml"), "[engine\nmax_steps = ").unwrap();

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "CFG-LOAD-002");
}

#[test]
#[serial]
fn zero_limits_fail_loading() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("chatflow.toml"),
        "[engine]\nmax_steps = 0\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "CFG-VALID-001");
    assert!(err.message.contains("max_steps"));
}

#[test]
#[serial]
fn zero_limits_from_env_fail_loading() {
    clear_chatflow_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("CHATFLOW_ENGINE_MAX_STEPS", "0");

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    clear_chatflow_env();
    assert_eq!(err.code, "CFG-VALID-001");

    env::set_var("CHATFLOW_CHANNEL_SEND_TIMEOUT_MS", "0");
    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    clear_chatflow_env();
    assert!(err.message.contains("send_timeout_ms"));
}

#[test]
fn env_documentation_lists_every_override() {
    let docs = ConfigLoader::env_var_documentation();
    for key in CHATFLOW_ENV {
        assert!(
            docs.iter().any(|line| line.starts_with(key)),
            "{} is undocumented",
            key
        );
    }
}
