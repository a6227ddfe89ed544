// SPDX-License-Identifier: MIT OR Apache-2.0
use jct_error::{ErrorCode, HarnessError};
use serde_json::Value;
use std::fmt;

/// A method-level `error` response (RFC 8620 §3.6.2).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodError {
    /// The error `type`, e.g. `"invalidArguments"`.
    pub error_type: String,
    /// Optional server-provided description.
    pub description: Option<String>,
    /// The full error arguments object.
    pub args: Value,
}

impl MethodError {
    /// Build from the arguments of an `["error", {...}, id]` response.
    pub fn from_args(args: &Value) -> Self {
        Self {
            error_type: args
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            description: args
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            args: args.clone(),
        }
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JMAP method error: {}", self.error_type)?;
        if let Some(ref d) = self.description {
            write!(f, " - {d}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MethodError {}

/// Errors surfaced by a [`JmapApi`](crate::JmapApi).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// A method call returned an `error` response.
    #[error(transparent)]
    Method(#[from] MethodError),

    /// The session resource is unusable.
    #[error("invalid session: {0}")]
    Session(String),

    /// A response body could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Stable code for this error when it aborts a run.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::TransportNetwork,
            Self::Http { .. } => ErrorCode::TransportHttp,
            Self::Method(_) => ErrorCode::TransportMethodError,
            Self::Session(_) => ErrorCode::SessionInvalid,
            Self::Decode(_) => ErrorCode::TransportDecode,
        }
    }

    /// The method error type, if this is a method-level error.
    pub fn method_error_type(&self) -> Option<&str> {
        match self {
            Self::Method(m) => Some(m.error_type.as_str()),
            _ => None,
        }
    }
}

impl From<ClientError> for HarnessError {
    fn from(err: ClientError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let base = HarnessError::new(code, message);
        match err {
            ClientError::Http { status, .. } => base.with_context("status", status),
            ClientError::Method(m) => base.with_context("type", m.error_type),
            other => base.with_source(other),
        }
    }
}
