// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-client
//!
//! The protocol-client surface the harness drives: the [`JmapApi`] trait,
//! its reqwest-backed implementation [`JmapClient`], session discovery and
//! validation, and exchange recording for failure diagnostics.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod session;
mod transport;

pub use client::JmapClient;
pub use error::{ClientError, MethodError};
pub use session::{REQUIRED_SESSION_PROPERTIES, cross_account_id, mail_account_id, parse_session};
pub use jct_relay::EventStream;
pub use transport::Transport;

use async_trait::async_trait;
use jct_core::{
    CAP_CORE, CAP_MAIL, CAP_SUBMISSION, CAP_VACATION, HttpExchange, Invocation, JmapResponse,
    RawResponse, Session, UploadResponse,
};
use serde_json::Value;

/// Default content type for uploads and downloads.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A JMAP account the harness can talk to.
///
/// Implementations record every HTTP exchange until
/// [`drain_exchanges`](JmapApi::drain_exchanges) is called.
#[async_trait]
pub trait JmapApi: Send + Sync {
    /// The validated session resource.
    fn session(&self) -> &Session;

    /// The primary mail account id.
    fn account_id(&self) -> &str;

    /// Send one API request. Method-level errors stay inside the response.
    async fn request(
        &self,
        using: Vec<String>,
        calls: Vec<Invocation>,
    ) -> Result<JmapResponse, ClientError>;

    /// POST an arbitrary body to the API endpoint and return the raw reply.
    async fn raw_post(&self, body: String, content_type: &str) -> Result<RawResponse, ClientError>;

    /// Upload bytes to `account_id` (default: the primary mail account).
    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        account_id: Option<&str>,
    ) -> Result<UploadResponse, ClientError>;

    /// Download a blob.
    async fn download(
        &self,
        blob_id: &str,
        content_type: &str,
        name: &str,
        account_id: Option<&str>,
    ) -> Result<RawResponse, ClientError>;

    /// Open the session's event-source endpoint (RFC 8620 §7.3).
    ///
    /// `types` is `*` or a comma-separated list of type names; `close_after`
    /// is `state` or `no`; `ping` is the keep-alive interval in seconds, 0
    /// for none.
    async fn event_source(
        &self,
        types: &str,
        close_after: &str,
        ping: u32,
    ) -> Result<EventStream, ClientError>;

    /// Remember the latest state token for a data type.
    fn update_state(&self, type_name: &str, state: &str);

    /// The last remembered state token for a data type.
    fn state(&self, type_name: &str) -> Option<String>;

    /// Take every exchange recorded since the previous drain.
    fn drain_exchanges(&self) -> Vec<HttpExchange>;

    /// Capabilities sent with ordinary calls: core and mail, plus submission
    /// and vacation response when the server advertises them.
    fn default_using(&self) -> Vec<String> {
        default_using(self.session())
    }

    /// Full response of a request, without turning method errors into `Err`.
    async fn raw_request(
        &self,
        using: Vec<String>,
        calls: Vec<Invocation>,
    ) -> Result<JmapResponse, ClientError> {
        self.request(using, calls).await
    }

    /// Make a single method call with [`default_using`](JmapApi::default_using)
    /// and return its arguments. An `error` response becomes
    /// [`ClientError::Method`].
    async fn call(&self, method: &str, args: Value) -> Result<Value, ClientError> {
        let resp = self
            .request(self.default_using(), vec![Invocation::new(method, args, "c0")])
            .await?;
        let first = resp
            .method_responses
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Decode("empty methodResponses".into()))?;
        if first.is_error() {
            return Err(MethodError::from_args(first.args()).into());
        }
        Ok(first.1)
    }
}

/// `using` list for a session; see [`JmapApi::default_using`].
pub fn default_using(session: &Session) -> Vec<String> {
    let mut using = vec![CAP_CORE.to_string(), CAP_MAIL.to_string()];
    for cap in [CAP_SUBMISSION, CAP_VACATION] {
        if session.has_capability(cap) {
            using.push(cap.to_string());
        }
    }
    using
}
