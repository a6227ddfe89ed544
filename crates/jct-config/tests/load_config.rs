// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for loading harness configuration from disk.

use jct_config::{AuthMethod, ConfigError, HarnessConfig, load_config, validate_config};
use std::io::Write;
use std::path::Path;

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn full_file_round_trips_through_loader() {
    let file = write_config(
        r#"
session_url = "https://mail.example.com/.well-known/jmap"
auth_method = "bearer"
timeout_ms = 15000
no_local_callback = true
verbose = true
relay_url = "https://relay.example.com"
log_level = "debug"

[accounts.primary]
username = "alice@example.com"
password = "token-a"

[accounts.secondary]
username = "bob@example.com"
password = "token-b"
"#,
    );
    let cfg = load_config(Some(file.path())).expect("load");
    assert_eq!(cfg.auth_method, AuthMethod::Bearer);
    assert_eq!(cfg.timeout_ms, 15_000);
    assert!(cfg.no_local_callback);
    assert!(cfg.verbose);
    assert_eq!(cfg.relay(), Some("https://relay.example.com"));
    assert_eq!(
        cfg.accounts.secondary.as_ref().map(|a| a.username.as_str()),
        Some("bob@example.com")
    );
    assert!(validate_config(&cfg).expect("valid").is_empty());
    assert_eq!(cfg.excluded_categories(), vec!["push-subscription".to_string()]);
}

#[test]
fn missing_file_is_reported_with_path() {
    let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
    match err {
        ConfigError::FileNotFound { path } => assert!(path.contains("here.toml")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn malformed_toml_is_parse_error() {
    let file = write_config("session_url = [unterminated");
    assert!(matches!(
        load_config(Some(file.path())),
        Err(ConfigError::ParseError { .. })
    ));
}

#[test]
fn unknown_auth_method_is_parse_error() {
    let file = write_config("auth_method = \"kerberos\"");
    assert!(matches!(
        load_config(Some(file.path())),
        Err(ConfigError::ParseError { .. })
    ));
}

#[test]
fn config_serializes_to_json_without_absent_options() {
    let cfg = HarnessConfig {
        relay_url: None,
        ..HarnessConfig::default()
    };
    let v = serde_json::to_value(&cfg).unwrap();
    assert!(v.get("session_url").is_none());
    assert!(v.get("relay_url").is_none());
    assert_eq!(v["auth_method"], serde_json::json!("basic"));
    assert_eq!(v["timeout_ms"], serde_json::json!(30_000));
}
