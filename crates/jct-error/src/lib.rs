// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy with stable error codes for the JMAP conformance harness.
//!
//! Fatal conditions that abort a run (bad configuration, an unreachable
//! server, a dirty account, a seeding failure) surface as a [`HarnessError`]
//! carrying an [`ErrorCode`], a message, an optional cause and structured
//! context. Check failures are not errors in this sense; they become
//! `fail` results in the report.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Exit status for a run where every required check passed.
pub const EXIT_OK: i32 = 0;
/// Exit status for a run with at least one failed required check.
pub const EXIT_REQUIRED_FAILED: i32 = 1;
/// Exit status for a run that could not complete.
pub const EXIT_FATAL: i32 = 2;

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

/// The phase of a run in which a fatal error arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Reading or validating the configuration.
    Config,
    /// Fetching and validating the session resource.
    Session,
    /// Talking to the server over HTTP.
    Transport,
    /// Checking that the account can be used.
    Precondition,
    /// Seeding the fixture data set.
    Fixture,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Lower-case label, equal to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Session => "session",
            Self::Transport => "transport",
            Self::Precondition => "precondition",
            Self::Fixture => "fixture",
            Self::Internal => "internal",
        }
    }
}

/// Stable, machine-readable code of a fatal error.
///
/// The serialized form is the `SCREAMING_SNAKE_CASE` variant name, and its
/// first word names the [`ErrorCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The configuration file could not be read.
    ConfigUnreadable,
    /// The configuration could not be parsed or failed validation.
    ConfigInvalid,
    /// The session resource lacks required properties.
    SessionInvalid,
    /// The session names no primary account for the mail capability.
    SessionNoMailAccount,
    /// DNS, connect, TLS or timeout failure.
    TransportNetwork,
    /// The server answered with a non-success HTTP status.
    TransportHttp,
    /// The server's reply could not be decoded.
    TransportDecode,
    /// A JMAP method answered with an `error` invocation.
    TransportMethodError,
    /// The account holds emails or custom mailboxes and force mode is off.
    PreconditionAccountNotEmpty,
    /// Force-cleaning could not empty the account.
    PreconditionCleanFailed,
    /// A fixture could not be created.
    FixtureSeedFailed,
    /// Unexpected failure inside the harness.
    Internal,
}

impl ErrorCode {
    /// The phase this code belongs to.
    pub fn category(self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            ConfigUnreadable | ConfigInvalid => ErrorCategory::Config,
            SessionInvalid | SessionNoMailAccount => ErrorCategory::Session,
            TransportNetwork | TransportHttp | TransportDecode | TransportMethodError => {
                ErrorCategory::Transport
            }
            PreconditionAccountNotEmpty | PreconditionCleanFailed => ErrorCategory::Precondition,
            FixtureSeedFailed => ErrorCategory::Fixture,
            Internal => ErrorCategory::Internal,
        }
    }

    /// Wire form of the code, e.g. `"CONFIG_INVALID"`.
    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            ConfigUnreadable => "CONFIG_UNREADABLE",
            ConfigInvalid => "CONFIG_INVALID",
            SessionInvalid => "SESSION_INVALID",
            SessionNoMailAccount => "SESSION_NO_MAIL_ACCOUNT",
            TransportNetwork => "TRANSPORT_NETWORK",
            TransportHttp => "TRANSPORT_HTTP",
            TransportDecode => "TRANSPORT_DECODE",
            TransportMethodError => "TRANSPORT_METHOD_ERROR",
            PreconditionAccountNotEmpty => "PRECONDITION_ACCOUNT_NOT_EMPTY",
            PreconditionCleanFailed => "PRECONDITION_CLEAN_FAILED",
            FixtureSeedFailed => "FIXTURE_SEED_FAILED",
            Internal => "INTERNAL",
        }
    }

    /// What the operator can do about it, where there is something to do.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigUnreadable => Some("pass an existing TOML file with -c"),
            Self::PreconditionAccountNotEmpty => Some("use -f to force-delete existing data"),
            Self::PreconditionCleanFailed => {
                Some("empty the account by hand, some mailboxes refused deletion")
            }
            Self::SessionNoMailAccount => {
                Some("the account must have urn:ietf:params:jmap:mail enabled")
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HarnessError
// ---------------------------------------------------------------------------

/// A fatal harness error.
///
/// ```
/// use jct_error::{ErrorCode, HarnessError};
///
/// let err = HarnessError::new(ErrorCode::PreconditionAccountNotEmpty, "account is not empty")
///     .with_context("emails", 3)
///     .with_context("mailboxes", 1);
/// assert_eq!(err.to_string(), "[PRECONDITION_ACCOUNT_NOT_EMPTY] account is not empty (emails=3, mailboxes=1)");
/// assert_eq!(err.exit_code(), jct_error::EXIT_FATAL);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {message}{}", render_context(.context))]
pub struct HarnessError {
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Key/value diagnostics, rendered in key order.
    pub context: BTreeMap<String, Value>,
    /// Underlying cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HarnessError {
    /// An error with no context and no cause.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Record a diagnostic value. Values that do not serialize are skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    /// Record the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The phase the error arose in.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Process exit status. Every harness error is fatal.
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }
}

fn render_context(context: &BTreeMap<String, Value>) -> String {
    if context.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = context
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect();
    format!(" ({})", pairs.join(", "))
}
