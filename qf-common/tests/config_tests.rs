//! Tests for configuration resolution
//!
//! Priority order: CLI > environment > TOML file > compiled default.
//! Tests that touch QF_* environment variables are marked #[serial].

use qf_common::config::{
    CliOverrides, MatchPolicyKind, ServerConfig, TomlConfig, DEFAULT_PORT, ENV_CONFIG,
    ENV_DATABASE, ENV_HOST, ENV_PORT,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    env::remove_var(ENV_CONFIG);
    env::remove_var(ENV_HOST);
    env::remove_var(ENV_PORT);
    env::remove_var(ENV_DATABASE);
}

#[test]
#[serial]
fn test_defaults_when_nothing_configured() {
    clear_env();
    let config = ServerConfig::from_sources(&CliOverrides::default(), &TomlConfig::default()).unwrap();

    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.match_policy, MatchPolicyKind::Lexical);
    assert_eq!(config.confusion_window, Duration::from_secs(300));
    assert!(config.database_path.ends_with("questionflow.db"));
}

#[test]
#[serial]
fn test_toml_overrides_defaults() {
    clear_env();
    let file = TomlConfig::parse(
        r#"
        [server]
        port = 6001
        client_url = "http://classroom.local"

        [doubts]
        match_policy = "topic"
        similarity_threshold = 0.65

        [confusion]
        window_secs = 120

        [rooms]
        connection_buffer = 32
        "#,
    )
    .unwrap();

    let config = ServerConfig::from_sources(&CliOverrides::default(), &file).unwrap();
    assert_eq!(config.port, 6001);
    assert_eq!(config.client_url, "http://classroom.local");
    assert_eq!(config.match_policy, MatchPolicyKind::Topic);
    assert!((config.similarity_threshold - 0.65).abs() < f64::EPSILON);
    assert_eq!(config.confusion_window, Duration::from_secs(120));
    assert_eq!(config.connection_buffer, 32);
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    env::set_var(ENV_PORT, "7002");
    env::set_var(ENV_DATABASE, "/tmp/qf-env.db");

    let file = TomlConfig::parse("[server]\nport = 6001\n").unwrap();
    let config = ServerConfig::from_sources(&CliOverrides::default(), &file).unwrap();

    assert_eq!(config.port, 7002);
    assert_eq!(config.database_path, PathBuf::from("/tmp/qf-env.db"));
    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_PORT, "7002");
    env::set_var(ENV_HOST, "0.0.0.0");

    let cli = CliOverrides {
        port: Some(8003),
        ..Default::default()
    };
    let config = ServerConfig::from_sources(&cli, &TomlConfig::default()).unwrap();

    assert_eq!(config.port, 8003);
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.bind_addr(), "0.0.0.0:8003");
    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_port_is_config_error() {
    clear_env();
    env::set_var(ENV_PORT, "not-a-port");
    let result = ServerConfig::from_sources(&CliOverrides::default(), &TomlConfig::default());
    assert!(result.is_err());
    clear_env();
}

#[test]
#[serial]
fn test_threshold_out_of_range_rejected() {
    clear_env();
    let file = TomlConfig::parse("[doubts]\nsimilarity_threshold = 1.5\n").unwrap();
    assert!(ServerConfig::from_sources(&CliOverrides::default(), &file).is_err());
}

#[test]
#[serial]
fn test_zero_window_rejected() {
    clear_env();
    let file = TomlConfig::parse("[confusion]\nwindow_secs = 0\n").unwrap();
    assert!(ServerConfig::from_sources(&CliOverrides::default(), &file).is_err());
}

#[test]
fn test_unknown_match_policy_is_parse_error() {
    assert!(TomlConfig::parse("[doubts]\nmatch_policy = \"embedding\"\n").is_err());
}

#[test]
#[serial]
fn test_resolve_reads_explicit_config_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nport = 6100\n[logging]\nlevel = \"debug\"").unwrap();

    let cli = CliOverrides {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let config = ServerConfig::resolve(&cli).unwrap();
    assert_eq!(config.port, 6100);
    assert_eq!(config.log_level, "debug");
}

#[test]
#[serial]
fn test_resolve_missing_explicit_config_is_error() {
    clear_env();
    let cli = CliOverrides {
        config: Some(PathBuf::from("/nonexistent/questionflow/config.toml")),
        ..Default::default()
    };
    assert!(ServerConfig::resolve(&cli).is_err());
}

#[test]
#[serial]
fn test_resolve_missing_env_config_falls_back_to_defaults() {
    clear_env();
    env::set_var(ENV_CONFIG, "/nonexistent/questionflow/env-config.toml");
    let config = ServerConfig::resolve(&CliOverrides::default()).unwrap();
    assert_eq!(config.port, DEFAULT_PORT);
    clear_env();
}

#[test]
#[serial]
fn test_resolve_reads_env_config_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nport = 6200").unwrap();
    env::set_var(ENV_CONFIG, file.path());

    let config = ServerConfig::resolve(&CliOverrides::default()).unwrap();
    assert_eq!(config.port, 6200);
    clear_env();
}
