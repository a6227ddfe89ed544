// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-mock
//!
//! An in-memory JMAP account implementing [`JmapApi`], used to exercise the
//! lifecycle, runner and check catalog without a live server.
//!
//! The mock keeps mailboxes, emails, blobs, identities, submissions and the
//! vacation response per account and answers the RFC 8620 / RFC 8621 /
//! RFC 8621 submission methods the harness issues, including `*/changes`
//! and `*/queryChanges` from a per-record change log. Every committed
//! change is pushed to open event-source streams.
//!
//! Builder knobs inject the failures the harness has to survive: failing
//! methods, rejected imports and undeletable mailboxes.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compose;
mod email;
mod methods;
mod mime;
mod state;
mod submission;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use jct_client::{ClientError, EventStream, JmapApi};
use jct_core::{
    Account, CAP_CORE, CAP_MAIL, CAP_SUBMISSION, CAP_VACATION, ExchangeRequest, ExchangeResponse,
    HttpExchange, Invocation, JmapRequest, JmapResponse, RawResponse, ResultReference, Session,
    UploadResponse,
};
use jct_relay::Frame;
use serde_json::{Map, Value, json};
use state::AccountState;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

const UNKNOWN_CAPABILITY: &str = "urn:ietf:params:jmap:error:unknownCapability";
const NOT_JSON: &str = "urn:ietf:params:jmap:error:notJSON";
const NOT_REQUEST: &str = "urn:ietf:params:jmap:error:notRequest";
const EVENT_BACKLOG: usize = 64;

/// An in-memory account that answers JMAP calls.
#[derive(Debug)]
pub struct MockAccount {
    session: Session,
    account_id: String,
    data: Mutex<AccountState>,
    states: Mutex<BTreeMap<String, String>>,
    exchanges: Mutex<Vec<HttpExchange>>,
    events: broadcast::Sender<Value>,
}

impl Default for MockAccount {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAccount {
    /// Account `A1` for user `alice` with the standard role mailboxes.
    pub fn new() -> Self {
        Self::named("alice", "A1")
    }

    /// Empty account with `inbox`, `drafts`, `sent` and `trash` mailboxes.
    pub fn named(username: &str, account_id: &str) -> Self {
        let mut data = AccountState::default();
        for (name, role) in [
            ("Inbox", "inbox"),
            ("Drafts", "drafts"),
            ("Sent", "sent"),
            ("Trash", "trash"),
        ] {
            data.add_mailbox(name, Some(role), None);
        }
        settle(&mut data);
        let mut account_capabilities = Map::new();
        account_capabilities.insert(CAP_MAIL.into(), json!({}));
        let mut capabilities = Map::new();
        capabilities.insert(
            CAP_CORE.into(),
            json!({
                "maxSizeUpload": 50_000_000,
                "maxConcurrentUpload": 4,
                "maxSizeRequest": 10_000_000,
                "maxConcurrentRequests": 4,
                "maxCallsInRequest": 16,
                "maxObjectsInGet": 500,
                "maxObjectsInSet": 500,
                "collationAlgorithms": ["i;ascii-casemap", "i;octet"]
            }),
        );
        capabilities.insert(CAP_MAIL.into(), json!({}));
        let base = format!("mock://{username}");
        let mut session = Session {
            capabilities,
            accounts: BTreeMap::from([(
                account_id.to_string(),
                Account {
                    name: username.to_string(),
                    is_personal: true,
                    is_read_only: false,
                    account_capabilities,
                },
            )]),
            primary_accounts: BTreeMap::from([(CAP_MAIL.to_string(), account_id.to_string())]),
            username: username.to_string(),
            api_url: format!("{base}/api"),
            download_url: format!("{base}/download/{{accountId}}/{{blobId}}/{{name}}?type={{type}}"),
            upload_url: format!("{base}/upload/{{accountId}}"),
            event_source_url: format!(
                "{base}/events?types={{types}}&closeafter={{closeafter}}&ping={{ping}}"
            ),
            state: "session-0".into(),
            raw: Value::Null,
        };
        session.raw = serde_json::to_value(&session).unwrap_or_default();
        Self {
            session,
            account_id: account_id.to_string(),
            data: Mutex::new(data),
            states: Mutex::new(BTreeMap::new()),
            exchanges: Mutex::new(Vec::new()),
            events: broadcast::channel(EVENT_BACKLOG).0,
        }
    }

    fn data_mut(&mut self) -> &mut AccountState {
        self.data.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn data(&self) -> std::sync::MutexGuard<'_, AccountState> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advertise(&mut self, capability: &str) {
        self.session.capabilities.insert(capability.into(), json!({}));
        if let Some(account) = self.session.accounts.get_mut(&self.account_id) {
            account
                .account_capabilities
                .insert(capability.into(), json!({}));
        }
        self.session
            .primary_accounts
            .insert(capability.into(), self.account_id.clone());
        self.session.raw = serde_json::to_value(&self.session).unwrap_or_default();
    }

    /// Advertise submission and give the account one identity.
    pub fn with_submission(mut self) -> Self {
        self.advertise(CAP_SUBMISSION);
        let email = format!("{}@example.com", self.session.username);
        self.with_identity(&email)
    }

    /// Advertise the vacation-response capability.
    pub fn with_vacation(mut self) -> Self {
        self.advertise(CAP_VACATION);
        self
    }

    /// Add an identity with the given address.
    pub fn with_identity(mut self, email: &str) -> Self {
        let data = self.data_mut();
        let id = data.fresh_id("I");
        data.identities.push(json!({
            "id": id,
            "name": "",
            "email": email,
            "replyTo": null,
            "bcc": null,
            "textSignature": "",
            "htmlSignature": "",
            "mayDelete": true
        }));
        self
    }

    /// Add a role-less mailbox, optionally under the mailbox named `parent`.
    pub fn with_custom_mailbox(mut self, name: &str, parent: Option<&str>) -> Self {
        let data = self.data_mut();
        let parent_id = parent.and_then(|p| data.mailbox_by_name(p).map(|m| m.id.clone()));
        data.add_mailbox(name, None, parent_id);
        settle(data);
        self
    }

    /// Put `count` plain messages into the inbox.
    pub fn with_emails(mut self, count: usize) -> Self {
        let data = self.data_mut();
        let Some(inbox) = data
            .mailboxes
            .values()
            .find(|m| m.role.as_deref() == Some("inbox"))
            .map(|m| m.id.clone())
        else {
            return self;
        };
        for i in 0..count {
            let raw = format!(
                "From: filler@example.com\r\nSubject: Filler {i}\r\nMessage-ID: <filler-{i}@example.com>\r\n\r\nfiller\r\n"
            );
            data.insert_email(&inbox, raw.into_bytes(), "2026-01-01T00:00:00Z");
        }
        settle(data);
        self
    }

    /// Every call to `method` answers with an `error` of type `error_type`.
    pub fn with_failing_method(mut self, method: &str, error_type: &str) -> Self {
        self.data_mut()
            .failing_methods
            .insert(method.into(), error_type.into());
        self
    }

    /// `Email/import` refuses any blob containing `marker`.
    pub fn with_rejected_import(mut self, marker: &str) -> Self {
        self.data_mut().rejected_import_markers.push(marker.into());
        self
    }

    /// Destroying the mailbox named `name` fails with `forbidden`.
    pub fn with_undeletable_mailbox(mut self, name: &str) -> Self {
        self.data_mut().undeletable_mailboxes.insert(name.into());
        self
    }

    /// Drop the mailbox holding `role`.
    pub fn without_role(mut self, role: &str) -> Self {
        self.data_mut()
            .mailboxes
            .retain(|_, m| m.role.as_deref() != Some(role));
        self
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Number of stored emails.
    pub fn email_count(&self) -> usize {
        self.data().emails.len()
    }

    /// Names of all role-less mailboxes, sorted.
    pub fn custom_mailboxes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .data()
            .mailboxes
            .values()
            .filter(|m| m.role.is_none())
            .map(|m| m.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Id of the mailbox called `name`.
    pub fn mailbox_id(&self, name: &str) -> Option<String> {
        self.data().mailbox_by_name(name).map(|m| m.id.clone())
    }

    /// Subject lines of every stored email, sorted.
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .data()
            .emails
            .values()
            .filter_map(|e| e.message.subject())
            .collect();
        subjects.sort();
        subjects
    }

    /// Every method name invoked so far, in order.
    pub fn method_log(&self) -> Vec<String> {
        self.data().method_log.clone()
    }

    /// The vacation response as `VacationResponse/get` reports it.
    pub fn vacation_enabled(&self) -> bool {
        self.data()
            .vacation
            .as_ref()
            .is_some_and(|v| v["isEnabled"] == Value::Bool(true))
    }

    /// Name of every identity, in creation order.
    pub fn identity_names(&self) -> Vec<String> {
        self.data()
            .identities
            .iter()
            .map(|i| i["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Data types this account reports states for.
    fn state_types(&self) -> Vec<&'static str> {
        let mut types = vec!["Mailbox", "Thread", "Email"];
        if self.session.has_capability(CAP_SUBMISSION) {
            types.extend(["Identity", "EmailSubmission"]);
        }
        if self.session.has_capability(CAP_VACATION) {
            types.push("VacationResponse");
        }
        types
    }

    // ------------------------------------------------------------------
    // Request processing
    // ------------------------------------------------------------------

    fn record(&self, request: ExchangeRequest, response: ExchangeResponse) {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HttpExchange { request, response });
    }

    fn owns(&self, account_id: Option<&str>) -> bool {
        account_id.is_none_or(|id| id == self.account_id)
    }

    /// Run a request body, or return the HTTP status and problem document
    /// of a request-level error.
    fn process(&self, request: JmapRequest) -> Result<JmapResponse, (u16, Value)> {
        if let Some(unknown) = request
            .using
            .iter()
            .find(|cap| !self.session.has_capability(cap))
        {
            return Err((
                400,
                json!({
                    "type": UNKNOWN_CAPABILITY,
                    "status": 400,
                    "detail": format!("unsupported capability {unknown}")
                }),
            ));
        }
        let mut data = self.data();
        let mut created = request.created_ids.unwrap_or_default();
        let mut responses: Vec<Invocation> = Vec::new();
        for call in request.method_calls {
            let Invocation(name, args, call_id) = call;
            let permitted = methods::capability_for(&name)
                .is_none_or(|cap| request.using.iter().any(|u| u == cap));
            let reply = if !permitted {
                Err(json!({
                    "type": "unknownMethod",
                    "description": format!("{name} needs a capability missing from using"),
                }))
            } else {
                match resolve_references(&args, &responses) {
                    Some(args) => methods::dispatch(&mut data, &self.account_id, &name, &args, &mut created),
                    None => Err(json!({ "type": "invalidResultReference" })),
                }
            };
            let follow_ups = std::mem::take(&mut data.follow_ups);
            responses.push(match reply {
                Ok(args) => Invocation(name, args, call_id.clone()),
                Err(args) => Invocation("error".into(), args, call_id.clone()),
            });
            for (name, args) in follow_ups {
                responses.push(Invocation(name, args, call_id.clone()));
            }
        }
        let changed = data.take_committed();
        if !changed.is_empty() {
            let state = data.state();
            let types = changed
                .into_iter()
                .map(|kind| (kind.to_string(), json!(state)))
                .collect();
            // Nobody listening is not an error.
            let _ = self.events.send(state_change(&self.account_id, types));
        }
        Ok(JmapResponse {
            method_responses: responses,
            session_state: self.session.state.clone(),
            created_ids: (!created.is_empty()).then_some(created),
        })
    }
}

/// Replace every `#name` argument with the value its result reference
/// points at. `None` when a reference cannot be resolved.
fn resolve_references(args: &Value, earlier: &[Invocation]) -> Option<Value> {
    let Value::Object(map) = args else {
        return Some(args.clone());
    };
    let mut out = Map::new();
    for (key, value) in map {
        match key.strip_prefix('#') {
            Some(target) => {
                let reference: ResultReference = serde_json::from_value(value.clone()).ok()?;
                let source = earlier
                    .iter()
                    .find(|inv| inv.call_id() == reference.result_of && inv.name() == reference.name)?;
                out.insert(target.to_string(), eval_path(source.args(), &reference.path)?);
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Some(Value::Object(out))
}

/// Evaluate a result-reference path. `*` maps over arrays and flattens.
fn eval_path(value: &Value, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    walk(value, &segments)
}

fn walk(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    if *head == "*" {
        let mut flat = Vec::new();
        for item in value.as_array()? {
            match walk(item, rest)? {
                Value::Array(items) => flat.extend(items),
                other => flat.push(other),
            }
        }
        return Some(Value::Array(flat));
    }
    let next = match value {
        Value::Object(map) => map.get(*head)?,
        Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    walk(next, rest)
}

/// Clear the change backlog left by builder setup.
fn settle(data: &mut AccountState) {
    data.commit();
    data.take_committed();
}

fn state_change(account_id: &str, types: Map<String, Value>) -> Value {
    json!({ "@type": "StateChange", "changed": { account_id: types } })
}

/// The `state` frame a listener for `wanted` types sees for `event`, if
/// any of its types are wanted.
fn state_frame(event: &Value, account_id: &str, wanted: Option<&BTreeSet<String>>) -> Option<Frame> {
    let changed = event["changed"][account_id].as_object()?;
    let kept: Map<String, Value> = changed
        .iter()
        .filter(|(kind, _)| wanted.is_none_or(|w| w.contains(kind.as_str())))
        .map(|(kind, state)| (kind.clone(), state.clone()))
        .collect();
    if kept.is_empty() {
        return None;
    }
    Some(Frame {
        event: Some("state".into()),
        data: state_change(account_id, kept).to_string(),
    })
}

fn json_response(status: u16, body: &Value) -> RawResponse {
    RawResponse {
        status,
        headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
        body: body.to_string().into_bytes(),
    }
}

#[async_trait]
impl JmapApi for MockAccount {
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
        let request = JmapRequest::new(using, calls);
        let exchange_request = ExchangeRequest {
            method: "POST".into(),
            url: self.session.api_url.clone(),
            body: serde_json::to_value(&request).ok(),
        };
        match self.process(request) {
            Ok(response) => {
                self.record(
                    exchange_request,
                    ExchangeResponse {
                        status: 200,
                        body: serde_json::to_value(&response).ok(),
                    },
                );
                Ok(response)
            }
            Err((status, problem)) => {
                debug!(target: "jct.client", status, "mock request rejected");
                let body = problem.to_string();
                self.record(
                    exchange_request,
                    ExchangeResponse {
                        status,
                        body: Some(problem),
                    },
                );
                Err(ClientError::Http { status, body })
            }
        }
    }

    async fn raw_post(&self, body: String, content_type: &str) -> Result<RawResponse, ClientError> {
        let json_body = content_type
            .to_ascii_lowercase()
            .starts_with("application/json");
        let (status, reply) = match serde_json::from_str::<Value>(&body) {
            _ if !json_body => (
                400,
                json!({ "type": NOT_REQUEST, "status": 400, "detail": "Content-Type must be application/json" }),
            ),
            Err(_) => (400, json!({ "type": NOT_JSON, "status": 400 })),
            Ok(doc) => match serde_json::from_value::<JmapRequest>(doc) {
                Err(_) => (400, json!({ "type": NOT_REQUEST, "status": 400 })),
                Ok(request) => match self.process(request) {
                    Ok(response) => (200, serde_json::to_value(&response).unwrap_or_default()),
                    Err(problem) => problem,
                },
            },
        };
        self.record(
            ExchangeRequest {
                method: "POST".into(),
                url: self.session.api_url.clone(),
                body: Some(Value::String(body)),
            },
            ExchangeResponse {
                status,
                body: Some(reply.clone()),
            },
        );
        Ok(json_response(status, &reply))
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        account_id: Option<&str>,
    ) -> Result<UploadResponse, ClientError> {
        let url = self
            .session
            .upload_url_for(account_id.unwrap_or(&self.account_id));
        let summary = format!("<upload {} bytes {content_type}>", data.len());
        if !self.owns(account_id) {
            let problem = json!({ "type": "accountNotFound", "status": 404 });
            self.record(
                ExchangeRequest {
                    method: "POST".into(),
                    url,
                    body: Some(Value::String(summary)),
                },
                ExchangeResponse {
                    status: 404,
                    body: Some(problem.clone()),
                },
            );
            return Err(ClientError::Http {
                status: 404,
                body: problem.to_string(),
            });
        }
        let size = data.len() as u64;
        let blob_id = self.data().store_blob(content_type, data);
        let reply = UploadResponse {
            account_id: self.account_id.clone(),
            blob_id,
            content_type: content_type.to_string(),
            size,
        };
        self.record(
            ExchangeRequest {
                method: "POST".into(),
                url,
                body: Some(Value::String(summary)),
            },
            ExchangeResponse {
                status: 201,
                body: serde_json::to_value(&reply).ok(),
            },
        );
        Ok(reply)
    }

    async fn download(
        &self,
        blob_id: &str,
        content_type: &str,
        name: &str,
        account_id: Option<&str>,
    ) -> Result<RawResponse, ClientError> {
        let url = self.session.download_url_for(
            account_id.unwrap_or(&self.account_id),
            blob_id,
            content_type,
            name,
        );
        let blob = if self.owns(account_id) {
            self.data().blobs.get(blob_id).cloned()
        } else {
            None
        };
        let result = match blob {
            Some(blob) => {
                let served_type = if content_type.is_empty() {
                    blob.content_type
                } else {
                    content_type.to_string()
                };
                RawResponse {
                    status: 200,
                    headers: BTreeMap::from([("content-type".to_string(), served_type)]),
                    body: blob.data,
                }
            }
            None => json_response(404, &json!({ "type": "about:blank", "status": 404 })),
        };
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
        let receiver = self.events.subscribe();
        let wanted: Option<BTreeSet<String>> = (types != "*").then(|| {
            types
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        });
        let current = {
            let state = self.data().state();
            let all = self
                .state_types()
                .into_iter()
                .map(|kind| (kind.to_string(), json!(state)))
                .collect();
            state_frame(&state_change(&self.account_id, all), &self.account_id, wanted.as_ref())
        };
        self.record(
            ExchangeRequest {
                method: "GET".into(),
                url,
                body: None,
            },
            ExchangeResponse {
                status: 200,
                body: Some(Value::String("<event stream>".into())),
            },
        );
        let head = stream::iter(current);
        if close_after == "state" {
            return Ok(EventStream::new(200, "text/event-stream", head));
        }
        let account_id = self.account_id.clone();
        let rest = stream::unfold(
            (receiver, wanted, account_id),
            |(mut receiver, wanted, account_id)| async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            if let Some(frame) = state_frame(&event, &account_id, wanted.as_ref()) {
                                return Some((frame, (receiver, wanted, account_id)));
                            }
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        );
        Ok(EventStream::new(200, "text/event-stream", head.chain(rest)))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_path_flattens_wildcards() {
        let v = json!({"list": [{"emailIds": ["a", "b"]}, {"emailIds": ["c"]}]});
        assert_eq!(eval_path(&v, "/list/*/emailIds"), Some(json!(["a", "b", "c"])));
        assert_eq!(eval_path(&v, "/list/0/emailIds/1"), Some(json!("b")));
        assert_eq!(eval_path(&v, "/missing"), None);
    }

    #[test]
    fn builder_knobs_shape_the_account() {
        let mock = MockAccount::new()
            .with_custom_mailbox("P", None)
            .with_custom_mailbox("C", Some("P"))
            .with_emails(3)
            .without_role("trash");
        assert_eq!(mock.custom_mailboxes(), vec!["C".to_string(), "P".to_string()]);
        assert_eq!(mock.email_count(), 3);
        assert!(mock.mailbox_id("Trash").is_none());
    }

    #[test]
    fn submission_adds_capability_and_identity() {
        let mock = MockAccount::named("bob", "B7").with_submission();
        assert!(mock.session().has_capability(CAP_SUBMISSION));
        assert_eq!(mock.session().raw["primaryAccounts"][CAP_SUBMISSION], "B7");
        assert_eq!(mock.data().identities[0]["email"], "bob@example.com");
    }
}
