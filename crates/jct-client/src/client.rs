// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::error::ClientError;
use crate::session::{mail_account_id, parse_session};
use crate::transport::Transport;
use crate::{EventStream, JmapApi, OCTET_STREAM};
use async_trait::async_trait;
use jct_core::{
    ExchangeRequest, ExchangeResponse, HttpExchange, Invocation, JmapRequest, JmapResponse,
    RawResponse, Session, UploadResponse,
};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// reqwest-backed [`JmapApi`] bound to one account.
#[derive(Debug)]
pub struct JmapClient {
    transport: Transport,
    session: Session,
    account_id: String,
    states: Mutex<BTreeMap<String, String>>,
    exchanges: Mutex<Vec<HttpExchange>>,
}

impl JmapClient {
    /// Fetch and validate the session, then resolve the primary mail account.
    pub async fn connect(transport: Transport, session_url: &str) -> Result<Self, ClientError> {
        let session = parse_session(transport.get_json(session_url).await?)?;
        let account_id = mail_account_id(&session)?;
        debug!(target: "jct.client", username = %session.username, account = %account_id, "session ready");
        Ok(Self {
            transport,
            session,
            account_id,
            states: Mutex::new(BTreeMap::new()),
            exchanges: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, request: ExchangeRequest, response: ExchangeResponse) {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HttpExchange { request, response });
    }

    fn account<'a>(&'a self, account_id: Option<&'a str>) -> &'a str {
        account_id.unwrap_or(&self.account_id)
    }
}

/// Parse a body as JSON, falling back to the text itself.
fn body_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl JmapApi for JmapClient {
    fn session(&self) -> &Session {
        &self.session
    }

    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn request(
        &self,
        using: Vec<String>,
        calls: Vec<Invocation>,
    ) -> Result<JmapResponse, ClientError> {
        let url = self.session.api_url.clone();
        let request = JmapRequest::new(using, calls);
        let body = serde_json::to_value(&request).map_err(|e| ClientError::Decode(e.to_string()))?;
        let exchange_request = ExchangeRequest {
            method: "POST".into(),
            url: url.clone(),
            body: Some(body.clone()),
        };
        match self.transport.post_json(&url, &body).await {
            Ok(reply) => {
                self.record(
                    exchange_request,
                    ExchangeResponse {
                        status: 200,
                        body: Some(reply.clone()),
                    },
                );
                serde_json::from_value(reply).map_err(|e| ClientError::Decode(e.to_string()))
            }
            Err(ClientError::Http { status, body }) => {
                self.record(
                    exchange_request,
                    ExchangeResponse {
                        status,
                        body: Some(body_value(&body)),
                    },
                );
                Err(ClientError::Http { status, body })
            }
            Err(other) => Err(other),
        }
    }

    async fn raw_post(&self, body: String, content_type: &str) -> Result<RawResponse, ClientError> {
        let url = self.session.api_url.clone();
        let result = self
            .transport
            .fetch_raw(
                Method::POST,
                &url,
                Some((body.clone().into_bytes(), content_type)),
            )
            .await?;
        let reply = serde_json::from_slice(&result.body)
            .unwrap_or_else(|_| Value::String(format!("<binary {} bytes>", result.body.len())));
        self.record(
            ExchangeRequest {
                method: "POST".into(),
                url,
                body: Some(Value::String(body)),
            },
            ExchangeResponse {
                status: result.status,
                body: Some(reply),
            },
        );
        Ok(result)
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        account_id: Option<&str>,
    ) -> Result<UploadResponse, ClientError> {
        let url = self.session.upload_url_for(self.account(account_id));
        let summary = format!("<upload {} bytes {content_type}>", data.len());
        let result = self
            .transport
            .fetch_raw(Method::POST, &url, Some((data, content_type)))
            .await?;
        let text = String::from_utf8_lossy(&result.body).into_owned();
        self.record(
            ExchangeRequest {
                method: "POST".into(),
                url,
                body: Some(Value::String(summary)),
            },
            ExchangeResponse {
                status: result.status,
                body: Some(body_value(&text)),
            },
        );
        if !(200..300).contains(&result.status) {
            return Err(ClientError::Http {
                status: result.status,
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn download(
        &self,
        blob_id: &str,
        content_type: &str,
        name: &str,
        account_id: Option<&str>,
    ) -> Result<RawResponse, ClientError> {
        let content_type = if content_type.is_empty() {
            OCTET_STREAM
        } else {
            content_type
        };
        let url =
            self.session
                .download_url_for(self.account(account_id), blob_id, content_type, name);
        let result = self.transport.fetch_raw(Method::GET, &url, None).await?;
        self.record(
            ExchangeRequest {
                method: "GET".into(),
                url,
                body: None,
            },
            ExchangeResponse {
                status: result.status,
                body: Some(Value::String(format!("<binary {} bytes>", result.body.len()))),
            },
        );
        Ok(result)
    }

    async fn event_source(
        &self,
        types: &str,
        close_after: &str,
        ping: u32,
    ) -> Result<EventStream, ClientError> {
        let url = self.session.event_source_url_for(types, close_after, ping);
        let stream = self.transport.open_stream(&url).await?;
        self.record(
            ExchangeRequest {
                method: "GET".into(),
                url,
                body: None,
            },
            ExchangeResponse {
                status: stream.status(),
                body: Some(Value::String(format!("<event stream {}>", stream.content_type()))),
            },
        );
        Ok(stream)
    }

    fn update_state(&self, type_name: &str, state: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.to_string(), state.to_string());
    }

    fn state(&self, type_name: &str) -> Option<String> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    fn drain_exchanges(&self) -> Vec<HttpExchange> {
        std::mem::take(&mut *self.exchanges.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
