// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for `JmapClient` against a stub HTTP server.

use jct_client::{ClientError, JmapApi, JmapClient, Transport};
use jct_config::{AccountCredentials, AuthMethod};
use jct_core::{CAP_CORE, CAP_MAIL, CAP_SUBMISSION, Invocation};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_doc(base: &str, extra_caps: &[&str]) -> Value {
    let mut caps = serde_json::Map::new();
    caps.insert(CAP_CORE.into(), json!({}));
    caps.insert(CAP_MAIL.into(), json!({}));
    for c in extra_caps {
        caps.insert((*c).into(), json!({}));
    }
    json!({
        "capabilities": caps,
        "accounts": { "A1": { "name": "alice", "isPersonal": true, "isReadOnly": false,
                              "accountCapabilities": { CAP_MAIL: {} } } },
        "primaryAccounts": { CAP_MAIL: "A1" },
        "username": "alice",
        "apiUrl": format!("{base}/api"),
        "downloadUrl": format!("{base}/download/{{accountId}}/{{blobId}}/{{name}}?accept={{type}}"),
        "uploadUrl": format!("{base}/upload/{{accountId}}"),
        "eventSourceUrl": format!("{base}/events?types={{types}}&closeafter={{closeafter}}&ping={{ping}}"),
        "state": "s0"
    })
}

fn transport() -> Transport {
    Transport::new(
        AuthMethod::Basic,
        &AccountCredentials {
            username: "alice".into(),
            password: "s3cret".into(),
        },
        Duration::from_secs(5),
    )
    .expect("transport")
}

async fn connected(server: &MockServer, extra_caps: &[&str]) -> JmapClient {
    Mock::given(method("GET"))
        .and(path("/.well-known/jmap"))
        .and(header("authorization", "Basic YWxpY2U6czNjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_doc(&server.uri(), extra_caps)))
        .mount(server)
        .await;
    JmapClient::connect(transport(), &format!("{}/.well-known/jmap", server.uri()))
        .await
        .expect("connect")
}

#[tokio::test]
async fn connect_resolves_mail_account() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    assert_eq!(client.account_id(), "A1");
    assert_eq!(client.session().username, "alice");
    assert_eq!(client.default_using(), vec![CAP_CORE.to_string(), CAP_MAIL.to_string()]);
}

#[tokio::test]
async fn default_using_adds_advertised_submission() {
    let server = MockServer::start().await;
    let client = connected(&server, &[CAP_SUBMISSION]).await;
    assert!(client.default_using().contains(&CAP_SUBMISSION.to_string()));
}

#[tokio::test]
async fn session_missing_property_is_rejected() {
    let server = MockServer::start().await;
    let mut doc = session_doc(&server.uri(), &[]);
    doc.as_object_mut().unwrap().remove("uploadUrl");
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc))
        .mount(&server)
        .await;
    let err = JmapClient::connect(transport(), &format!("{}/s", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Session(ref m) if m.contains("uploadUrl")), "{err}");
}

#[tokio::test]
async fn session_http_error_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;
    let err = JmapClient::connect(transport(), &format!("{}/s", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 401, .. }));
}

#[tokio::test]
async fn call_returns_arguments_and_records_exchange() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_partial_json(json!({"methodCalls": [["Core/echo", {"hello": true}, "c0"]]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [["Core/echo", {"hello": true}, "c0"]],
            "sessionState": "s0"
        })))
        .mount(&server)
        .await;

    let args = client.call("Core/echo", json!({"hello": true})).await.expect("call");
    assert_eq!(args, json!({"hello": true}));

    let exchanges = client.drain_exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].request.method, "POST");
    assert_eq!(exchanges[0].response.status, 200);
    assert!(client.drain_exchanges().is_empty(), "drain clears the log");
}

#[tokio::test]
async fn error_response_becomes_method_error() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [["error", {"type": "unknownMethod"}, "c0"]],
            "sessionState": "s0"
        })))
        .mount(&server)
        .await;

    let err = client.call("Nope/get", json!({})).await.unwrap_err();
    assert_eq!(err.method_error_type(), Some("unknownMethod"));
    assert_eq!(err.to_string(), "JMAP method error: unknownMethod");

    let raw = client
        .raw_request(client.default_using(), vec![Invocation::new("Nope/get", json!({}), "x")])
        .await
        .expect("raw request keeps method errors");
    assert!(raw.method_responses[0].is_error());
}

#[tokio::test]
async fn http_error_on_api_is_recorded() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"type": "urn:ietf:params:jmap:error:notRequest"})),
        )
        .mount(&server)
        .await;
    let err = client.call("Core/echo", json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 400, .. }));
    let ex = client.drain_exchanges();
    assert_eq!(ex[0].response.status, 400);
    assert_eq!(
        ex[0].response.body.as_ref().unwrap()["type"],
        json!("urn:ietf:params:jmap:error:notRequest")
    );
}

#[tokio::test]
async fn upload_and_download_summarize_binary_bodies() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/upload/A1"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "accountId": "A1", "blobId": "B1", "type": "image/png", "size": 4
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/A1/B1/pic.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(vec![1u8, 2, 3, 4]),
        )
        .mount(&server)
        .await;

    let up = client.upload(vec![1, 2, 3, 4], "image/png", None).await.expect("upload");
    assert_eq!(up.blob_id, "B1");
    assert_eq!(up.size, 4);

    let down = client.download("B1", "image/png", "pic.png", None).await.expect("download");
    assert_eq!(down.status, 200);
    assert_eq!(down.body, vec![1, 2, 3, 4]);
    assert_eq!(down.header("Content-Type"), Some("image/png"));

    let ex = client.drain_exchanges();
    assert_eq!(ex.len(), 2);
    assert_eq!(ex[0].request.body, Some(json!("<upload 4 bytes image/png>")));
    assert_eq!(ex[1].response.body, Some(json!("<binary 4 bytes>")));
}

#[tokio::test]
async fn raw_post_returns_non_success_without_error() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "type": "urn:ietf:params:jmap:error:notJSON", "status": 400
        })))
        .mount(&server)
        .await;
    let resp = client.raw_post("{not json".into(), "application/json").await.expect("raw post");
    assert_eq!(resp.status, 400);
    let body: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["type"], json!("urn:ietf:params:jmap:error:notJSON"));
}

#[tokio::test]
async fn state_tokens_are_per_type() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    assert_eq!(client.state("Email"), None);
    client.update_state("Email", "e1");
    client.update_state("Mailbox", "m1");
    client.update_state("Email", "e2");
    assert_eq!(client.state("Email").as_deref(), Some("e2"));
    assert_eq!(client.state("Mailbox").as_deref(), Some("m1"));
}

#[tokio::test]
async fn bearer_token_is_sent_on_session_and_api_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jmap"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_doc(&server.uri(), &[])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [["Core/echo", {"ok": true}, "c0"]],
            "sessionState": "s0"
        })))
        .mount(&server)
        .await;
    let bearer = Transport::new(
        AuthMethod::Bearer,
        &AccountCredentials {
            username: "alice".into(),
            password: "tok-123".into(),
        },
        Duration::from_secs(5),
    )
    .expect("transport");
    let client = JmapClient::connect(bearer, &format!("{}/.well-known/jmap", server.uri()))
        .await
        .expect("connect");
    let args = client.call("Core/echo", json!({"ok": true})).await.unwrap();
    assert_eq!(args, json!({"ok": true}));
}

#[tokio::test]
async fn session_fetch_follows_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jmap"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("location", format!("{}/jmap/session", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jmap/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_doc(&server.uri(), &[])))
        .mount(&server)
        .await;
    let client = JmapClient::connect(transport(), &format!("{}/.well-known/jmap", server.uri()))
        .await
        .expect("connect");
    assert_eq!(client.account_id(), "A1");
}

// ── Event source ────────────────────────────────────────────────────

#[tokio::test]
async fn event_source_yields_state_frames_then_ends() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    let body = concat!(
        "event: state\n",
        "data: {\"@type\":\"StateChange\",\"changed\":{\"A1\":{\"Email\":\"s4\"}}}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("types", "*"))
        .and(query_param("closeafter", "state"))
        .and(header("accept", "text/event-stream"))
        .and(header("authorization", "Basic YWxpY2U6czNjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut events = client.event_source("*", "state", 0).await.unwrap();
    assert_eq!(events.status(), 200);
    assert!(events.content_type().starts_with("text/event-stream"));
    let frame = events.next_named("state", Duration::from_secs(2)).await.unwrap();
    assert_eq!(frame.payload().unwrap()["changed"]["A1"]["Email"], "s4");
    assert!(events.next_frame(Duration::from_secs(2)).await.is_none());
    assert!(events.is_finished());

    let recorded = client.drain_exchanges();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].request.method, "GET");
    assert!(recorded[0].request.url.contains("closeafter=state"));
}

#[tokio::test]
async fn event_source_rejection_keeps_status() {
    let server = MockServer::start().await;
    let client = connected(&server, &[]).await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let mut events = client.event_source("Email", "no", 0).await.unwrap();
    assert_eq!(events.status(), 403);
    assert!(events.next_frame(Duration::from_secs(1)).await.is_none());
    assert!(events.is_finished());
}
