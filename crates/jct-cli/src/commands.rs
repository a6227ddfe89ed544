// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations shared by `main`.

use anyhow::Context;
use jct_config::{ConfigError, ConfigWarning, HarnessConfig};
use jct_core::TestReport;
use jct_error::{ErrorCode, HarnessError};
use schemars::schema_for;
use std::path::Path;

/// Schema types that can be printed by the `schema` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchemaKind {
    /// JSON schema for [`HarnessConfig`].
    Config,
    /// JSON schema for [`TestReport`].
    Report,
}

/// Return the pretty JSON schema for `kind`.
pub fn schema_json(kind: SchemaKind) -> anyhow::Result<String> {
    let value = match kind {
        SchemaKind::Config => serde_json::to_value(schema_for!(HarnessConfig))?,
        SchemaKind::Report => serde_json::to_value(schema_for!(TestReport))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

/// Load, overlay and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<(HarnessConfig, Vec<ConfigWarning>), HarnessError> {
    let config = jct_config::load_config(Some(path)).map_err(config_error)?;
    let warnings = jct_config::validate_config(&config).map_err(config_error)?;
    Ok((config, warnings))
}

fn config_error(err: ConfigError) -> HarnessError {
    let code = match err {
        ConfigError::FileNotFound { .. } => ErrorCode::ConfigUnreadable,
        ConfigError::ParseError { .. } | ConfigError::ValidationError { .. } => {
            ErrorCode::ConfigInvalid
        }
    };
    HarnessError::new(code, err.to_string())
}

/// Write `report` as pretty JSON to `out`, or stdout when `out` is `None`.
pub fn write_report(report: &TestReport, out: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    match out {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("write report to '{}'", path.display()))?;
            eprintln!("Report written to {}", path.display());
            Ok(())
        }
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_schema_lists_its_fields() {
        let schema: serde_json::Value =
            serde_json::from_str(&schema_json(SchemaKind::Config).unwrap()).unwrap();
        let props = schema["properties"].as_object().unwrap();
        for key in ["session_url", "auth_method", "timeout_ms", "accounts"] {
            assert!(props.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn report_schema_uses_camel_case() {
        let schema: serde_json::Value =
            serde_json::from_str(&schema_json(SchemaKind::Report).unwrap()).unwrap();
        assert!(schema["properties"]["durationMs"].is_object());
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigUnreadable);
    }

    #[test]
    fn invalid_file_is_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session_url = \"ftp://example.com\"").unwrap();
        let err = load(file.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
        assert!(err.message.contains("http(s)"), "{}", err.message);
    }

    #[test]
    fn valid_file_returns_warnings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "session_url = \"https://jmap.example.com/.well-known/jmap\"\n\
             relay_url = \"\"\n\
             [accounts.primary]\nusername = \"alice\"\npassword = \"secret\""
        )
        .unwrap();
        let (config, warnings) = load(file.path()).unwrap();
        assert_eq!(config.accounts.primary.username, "alice");
        assert!(warnings.contains(&ConfigWarning::NoSecondaryAccount));
        assert!(warnings.contains(&ConfigWarning::RelayDisabled));
    }

    #[test]
    fn report_is_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&TestReport::new("https://x", 5, Vec::new()), Some(&path)).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["server"], "https://x");
        assert_eq!(value["summary"]["total"], 0);
    }
}
