// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::error::ClientError;
use jct_config::{AccountCredentials, AuthMethod};
use jct_core::RawResponse;
use jct_relay::{EventStream, decode_frames};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, redirect};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("jmap-test/", env!("CARGO_PKG_VERSION"));

/// Upper bound on one event-source read; the caller normally hangs up long
/// before.
const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Authenticated HTTP plumbing shared by every request a client makes.
#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    method: AuthMethod,
    username: String,
    secret: String,
}

impl Transport {
    /// Build a transport for one account.
    pub fn new(
        method: AuthMethod,
        account: &AccountCredentials,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .redirect(redirect::Policy::limited(5))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            method,
            username: account.username.clone(),
            secret: account.password.clone(),
        })
    }

    /// Attach this account's credentials to a request.
    pub fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.method {
            AuthMethod::Basic => req.basic_auth(&self.username, Some(&self.secret)),
            AuthMethod::Bearer => req.bearer_auth(&self.secret),
        }
    }

    /// GET a JSON document. Non-2xx statuses become [`ClientError::Http`].
    pub async fn get_json(&self, url: &str) -> Result<Value, ClientError> {
        debug!(target: "jct.client", method = "GET", url, "request");
        let resp = self
            .authorize(self.http.get(url))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!(target: "jct.client", status, bytes = text.len(), "response");
        if !(200..300).contains(&status) {
            return Err(ClientError::Http { status, body: text });
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ClientError> {
        debug!(target: "jct.client", method = "POST", url, "request");
        let resp = self
            .authorize(self.http.post(url))
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!(target: "jct.client", status, bytes = text.len(), "response");
        if !(200..300).contains(&status) {
            return Err(ClientError::Http { status, body: text });
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Send a request and return the raw reply whatever its status.
    pub async fn fetch_raw(
        &self,
        method: Method,
        url: &str,
        body: Option<(Vec<u8>, &str)>,
    ) -> Result<RawResponse, ClientError> {
        debug!(target: "jct.client", method = %method, url, "raw request");
        let mut req = self.authorize(self.http.request(method, url));
        if let Some((bytes, content_type)) = body {
            req = req.header(CONTENT_TYPE, content_type).body(bytes);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?.to_vec();
        debug!(target: "jct.client", status, bytes = body.len(), "raw response");
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// GET a `text/event-stream` resource and hand back its frames as they
    /// arrive. The status is returned as-is; a non-2xx reply yields an
    /// empty stream.
    pub async fn open_stream(&self, url: &str) -> Result<EventStream, ClientError> {
        debug!(target: "jct.client", method = "GET", url, "event stream");
        let resp = self
            .authorize(self.http.get(url))
            .header(ACCEPT, "text/event-stream")
            .timeout(STREAM_TIMEOUT)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        debug!(target: "jct.client", status, content_type = %content_type, "event stream opened");
        if !(200..300).contains(&status) {
            return Ok(EventStream::new(status, content_type, futures::stream::empty()));
        }
        let frames = decode_frames(Box::pin(resp.bytes_stream()));
        Ok(EventStream::new(status, content_type, frames))
    }
}
