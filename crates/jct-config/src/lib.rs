// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the JMAP conformance harness.
//!
//! [`HarnessConfig`] describes the server under test and the accounts the
//! harness logs in with. It is read from a TOML file, overlaid with `JCT_*`
//! environment variables, and checked by [`validate_config`], which separates
//! hard errors from advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent a run but narrow what it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No secondary account; checks needing a second mailbox are skipped.
    NoSecondaryAccount,
    /// The push relay is disabled; push-subscription checks are skipped.
    RelayDisabled,
    /// The HTTP timeout is unusually large.
    LargeTimeout {
        /// Timeout in milliseconds.
        ms: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NoSecondaryAccount => {
                write!(f, "no secondary account configured: submission checks will be skipped")
            }
            ConfigWarning::RelayDisabled => {
                write!(f, "push relay disabled: push-subscription checks will be skipped")
            }
            ConfigWarning::LargeTimeout { ms } => {
                write!(f, "request timeout is unusually large ({ms}ms)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// How the harness authenticates to the server.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// HTTP Basic with `username:password`.
    #[default]
    Basic,
    /// Bearer token; the account password is the token.
    Bearer,
}

/// Login for one account.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AccountCredentials {
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password, or token when `auth_method = "bearer"`.
    #[serde(default)]
    pub password: String,
}

/// The accounts the harness logs in with.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Accounts {
    /// The account every check runs against.
    #[serde(default)]
    pub primary: AccountCredentials,
    /// A second account, used for submission and cross-account checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<AccountCredentials>,
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// JMAP session resource URL (usually `/.well-known/jmap`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    /// Authentication scheme.
    pub auth_method: AuthMethod,
    /// Per-request timeout in milliseconds (1–600 000).
    pub timeout_ms: u64,
    /// Set when the server cannot reach callbacks from this host; disables
    /// push-subscription checks.
    pub no_local_callback: bool,
    /// Debug logging.
    pub verbose: bool,
    /// Base URL of the push relay. Empty disables the relay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
    /// Log level override (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Account credentials.
    pub accounts: Accounts,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            session_url: None,
            auth_method: AuthMethod::Basic,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            no_local_callback: false,
            verbose: false,
            relay_url: Some(DEFAULT_RELAY_URL.into()),
            log_level: Some("info".into()),
            accounts: Accounts::default(),
        }
    }
}

impl HarnessConfig {
    /// The relay base URL, if the relay is enabled.
    pub fn relay(&self) -> Option<&str> {
        self.relay_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// `true` when a secondary account is configured.
    pub fn has_secondary(&self) -> bool {
        self.accounts.secondary.is_some()
    }

    /// Check categories that cannot run with this configuration.
    pub fn excluded_categories(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.has_secondary() {
            out.push("submission".to_string());
        }
        if self.no_local_callback {
            out.push("push-subscription".to_string());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default push relay.
pub const DEFAULT_RELAY_URL: &str = "https://smee.io";

/// Maximum allowed timeout (10 minutes).
const MAX_TIMEOUT_MS: u64 = 600_000;

/// Threshold above which a timeout generates a warning.
const LARGE_TIMEOUT_THRESHOLD_MS: u64 = 120_000;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`HarnessConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, starts from [`HarnessConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => HarnessConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into a [`HarnessConfig`].
pub fn parse_toml(content: &str) -> Result<HarnessConfig, ConfigError> {
    toml::from_str::<HarnessConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `JCT_SESSION_URL`
/// - `JCT_LOG_LEVEL`
/// - `JCT_RELAY_URL`
/// - `JCT_TIMEOUT_MS`
pub fn apply_env_overrides(config: &mut HarnessConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary lookup. [`apply_env_overrides`] passes
/// the process environment.
pub fn apply_overrides_from(
    config: &mut HarnessConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(val) = lookup("JCT_SESSION_URL") {
        config.session_url = Some(val);
    }
    if let Some(val) = lookup("JCT_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("JCT_RELAY_URL") {
        config.relay_url = Some(val);
    }
    if let Some(val) = lookup("JCT_TIMEOUT_MS") {
        config.timeout_ms = val.trim().parse().map_err(|_| ConfigError::ParseError {
            reason: format!("JCT_TIMEOUT_MS is not a number: '{val}'"),
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a configuration, returning advisory warnings.
///
/// Every hard problem is collected into one [`ConfigError::ValidationError`].
pub fn validate_config(config: &HarnessConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    match config.session_url.as_deref().map(str::trim) {
        None | Some("") => errors.push("session_url is required".into()),
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            errors.push(format!("session_url must be an http(s) URL, got '{url}'"));
        }
        Some(_) => {}
    }

    if config.accounts.primary.username.trim().is_empty() {
        errors.push("accounts.primary.username must not be empty".into());
    }
    if let Some(ref secondary) = config.accounts.secondary
        && secondary.username.trim().is_empty()
    {
        errors.push("accounts.secondary.username must not be empty".into());
    }

    if config.timeout_ms == 0 || config.timeout_ms > MAX_TIMEOUT_MS {
        errors.push(format!(
            "timeout_ms {} out of range (1..{MAX_TIMEOUT_MS})",
            config.timeout_ms
        ));
    } else if config.timeout_ms > LARGE_TIMEOUT_THRESHOLD_MS {
        warnings.push(ConfigWarning::LargeTimeout {
            ms: config.timeout_ms,
        });
    }

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if !config.has_secondary() {
        warnings.push(ConfigWarning::NoSecondaryAccount);
    }
    if config.relay().is_none() {
        warnings.push(ConfigWarning::RelayDisabled);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn minimal() -> HarnessConfig {
        parse_toml(
            r#"
            session_url = "https://jmap.test/.well-known/jmap"
            [accounts.primary]
            username = "alice"
            password = "pw"
            "#,
        )
        .expect("parse minimal")
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = minimal();
        assert_eq!(cfg.auth_method, AuthMethod::Basic);
        assert_eq!(cfg.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(cfg.relay(), Some(DEFAULT_RELAY_URL));
        assert!(!cfg.no_local_callback);
        assert!(cfg.accounts.secondary.is_none());
    }

    #[test]
    fn bearer_parses_lowercase() {
        let cfg = parse_toml("auth_method = \"bearer\"").unwrap();
        assert_eq!(cfg.auth_method, AuthMethod::Bearer);
        assert!(parse_toml("auth_method = \"digest\"").is_err());
    }

    #[test]
    fn minimal_validates_with_warnings() {
        let warnings = validate_config(&minimal()).expect("valid");
        assert_eq!(warnings, vec![ConfigWarning::NoSecondaryAccount]);
    }

    #[test]
    fn collects_every_error() {
        let mut cfg = HarnessConfig::default();
        cfg.timeout_ms = 0;
        cfg.log_level = Some("loud".into());
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert_eq!(reasons.len(), 4, "{reasons:?}");
                assert!(reasons.iter().any(|r| r.contains("session_url")));
                assert!(reasons.iter().any(|r| r.contains("username")));
                assert!(reasons.iter().any(|r| r.contains("timeout_ms")));
                assert!(reasons.iter().any(|r| r.contains("loud")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_non_http_session_url() {
        let mut cfg = minimal();
        cfg.session_url = Some("ftp://jmap.test".into());
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn empty_relay_disables_and_warns() {
        let mut cfg = minimal();
        cfg.relay_url = Some("  ".into());
        assert_eq!(cfg.relay(), None);
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::RelayDisabled));
    }

    #[test]
    fn large_timeout_warns() {
        let mut cfg = minimal();
        cfg.timeout_ms = 300_000;
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::LargeTimeout { ms: 300_000 }));
    }

    #[test]
    fn excluded_categories_follow_accounts_and_callback() {
        let mut cfg = minimal();
        assert_eq!(cfg.excluded_categories(), vec!["submission".to_string()]);
        cfg.accounts.secondary = Some(AccountCredentials {
            username: "bob".into(),
            password: "pw".into(),
        });
        cfg.no_local_callback = true;
        assert_eq!(
            cfg.excluded_categories(),
            vec!["push-subscription".to_string()]
        );
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("JCT_SESSION_URL", "http://other.test/jmap"),
            ("JCT_TIMEOUT_MS", "5000"),
            ("JCT_RELAY_URL", ""),
        ]);
        let mut cfg = minimal();
        apply_overrides_from(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.session_url.as_deref(), Some("http://other.test/jmap"));
        assert_eq!(cfg.timeout_ms, 5000);
        assert_eq!(cfg.relay(), None);
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn non_numeric_timeout_override_is_parse_error() {
        let mut cfg = minimal();
        let err = apply_overrides_from(&mut cfg, |k| {
            (k == "JCT_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
