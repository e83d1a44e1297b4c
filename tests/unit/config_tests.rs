//! Unit tests for configuration parsing and validation.

use agent_conduit::config::ConduitConfig;
use agent_conduit::orchestrator::session::PermissionMode;
use agent_conduit::AppError;

#[test]
fn empty_toml_yields_defaults() {
    let config = ConduitConfig::from_toml_str("").expect("empty config must parse");
    assert_eq!(config.agent_bin, "agent");
    assert_eq!(config.drain_timeout_seconds, 10);
    assert_eq!(config.dot_dir, ".conduit");
    assert_eq!(config.default_mode, PermissionMode::Default);
}

#[test]
fn fields_override_defaults() {
    let toml = r#"
        agent_bin = "copilot"
        drain_timeout_seconds = 3
        dot_dir = ".copilot"
        default_mode = "accept-edits"
    "#;
    let config = ConduitConfig::from_toml_str(toml).expect("config must parse");

    assert_eq!(config.agent_bin, "copilot");
    assert_eq!(config.drain_timeout_seconds, 3);
    assert_eq!(config.drain_timeout().as_secs(), 3);
    assert_eq!(config.dot_dir, ".copilot");
    assert_eq!(config.default_mode, PermissionMode::AcceptEdits);
}

#[test]
fn malformed_toml_is_a_config_error() {
    let result = ConduitConfig::from_toml_str("agent_bin = [not toml");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn empty_agent_bin_fails_validation() {
    let result = ConduitConfig::from_toml_str("agent_bin = \" \"");
    match result {
        Err(AppError::Config(msg)) => assert!(msg.contains("agent_bin")),
        other => panic!("expected config error, got: {other:?}"),
    }
}

#[test]
fn zero_drain_timeout_fails_validation() {
    let result = ConduitConfig::from_toml_str("drain_timeout_seconds = 0");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn dot_dir_must_be_a_bare_name() {
    let result = ConduitConfig::from_toml_str("dot_dir = \"nested/dir\"");
    assert!(matches!(result, Err(AppError::Config(_))));
}
