// SPDX-License-Identifier: MIT OR Apache-2.0
//! `MockAccount` driven through the `JmapApi` trait.

use jct_client::{ClientError, JmapApi};
use jct_core::{CAP_CORE, CAP_MAIL, Invocation, ResultReference};
use jct_mock::MockAccount;
use serde_json::{Value, json};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

// ── Request-level behaviour ─────────────────────────────────────────

#[tokio::test]
async fn echo_returns_arguments() {
    let mock = MockAccount::new();
    let args = mock.call("Core/echo", json!({"a": [1, 2]})).await.unwrap();
    assert_eq!(args, json!({"a": [1, 2]}));
    assert_eq!(mock.drain_exchanges().len(), 1);
}

#[tokio::test]
async fn unknown_capability_is_http_400() {
    let mock = MockAccount::new();
    let err = mock
        .raw_request(
            vec![CAP_CORE.into(), "urn:example:nope".into()],
            vec![Invocation::new("Core/echo", json!({}), "0")],
        )
        .await
        .unwrap_err();
    match err {
        ClientError::Http { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("unknownCapability"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn raw_post_classifies_bad_bodies() {
    let mock = MockAccount::new();
    let not_json = mock.raw_post("{nope".into(), "application/json").await.unwrap();
    assert_eq!(not_json.status, 400);
    let body: Value = serde_json::from_slice(&not_json.body).unwrap();
    assert_eq!(body["type"], "urn:ietf:params:jmap:error:notJSON");

    let not_request = mock
        .raw_post(r#"{"using": 3}"#.into(), "application/json")
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&not_request.body).unwrap();
    assert_eq!(body["type"], "urn:ietf:params:jmap:error:notRequest");
}

#[tokio::test]
async fn wrong_content_type_is_not_request() {
    let mock = MockAccount::new();
    let resp = mock
        .raw_post(r#"{"using": [], "methodCalls": []}"#.into(), "text/plain")
        .await
        .unwrap();
    assert_eq!(resp.status, 400);
    let body: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["type"], "urn:ietf:params:jmap:error:notRequest");
}

#[tokio::test]
async fn methods_outside_using_are_unknown() {
    let mock = MockAccount::new();
    let resp = mock
        .raw_request(
            vec![CAP_CORE.into()],
            vec![
                Invocation::new("Core/echo", json!({}), "0"),
                Invocation::new("Mailbox/get", json!({"accountId": "A1"}), "1"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(resp.by_call_id("0").unwrap().name(), "Core/echo");
    let refused = resp.by_call_id("1").unwrap();
    assert_eq!(refused.name(), "error");
    assert_eq!(refused.args()["type"], "unknownMethod");
}

#[tokio::test]
async fn missing_account_id_is_invalid_arguments() {
    let mock = MockAccount::new();
    let resp = mock
        .raw_request(
            vec![CAP_CORE.into(), CAP_MAIL.into()],
            vec![Invocation::new("Mailbox/get", json!({}), "0")],
        )
        .await
        .unwrap();
    assert_eq!(resp.method_responses[0].args()["type"], "invalidArguments");
}

#[tokio::test]
async fn result_references_chain_calls() {
    let mock = MockAccount::new().with_emails(2);
    let resp = mock
        .raw_request(
            vec![CAP_CORE.into(), CAP_MAIL.into()],
            vec![
                Invocation::new("Email/query", json!({"accountId": "A1"}), "q"),
                Invocation::new(
                    "Email/get",
                    json!({
                        "accountId": "A1",
                        "#ids": ResultReference::new("q", "Email/query", "/ids").to_value(),
                        "properties": ["subject"]
                    }),
                    "g",
                ),
            ],
        )
        .await
        .unwrap();
    let got = resp.by_call_id("g").unwrap();
    assert_eq!(got.name(), "Email/get");
    assert_eq!(got.args()["list"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn failing_method_surfaces_as_method_error() {
    let mock = MockAccount::new().with_failing_method("Mailbox/get", "serverFail");
    let err = mock.call("Mailbox/get", json!({})).await.unwrap_err();
    assert_eq!(err.method_error_type(), Some("serverFail"));
}

// ── Mailboxes and emails ────────────────────────────────────────────

#[tokio::test]
async fn destroy_with_remove_emails_clears_messages() {
    let mock = MockAccount::new().with_custom_mailbox("Box", None);
    let box_id = mock.mailbox_id("Box").unwrap();
    let blob = mock
        .upload(b"Subject: x\r\n\r\nbody".to_vec(), "message/rfc822", None)
        .await
        .unwrap();
    mock.call(
        "Email/import",
        json!({"accountId": "A1", "emails": {"e": {"blobId": blob.blob_id, "mailboxIds": {&box_id: true}}}}),
    )
    .await
    .unwrap();

    let refused = mock
        .call("Mailbox/set", json!({"accountId": "A1", "destroy": [&box_id]}))
        .await
        .unwrap();
    assert_eq!(refused["notDestroyed"][&box_id]["type"], "mailboxHasEmail");

    let done = mock
        .call("Mailbox/set", json!({"accountId": "A1", "destroy": [&box_id], "onDestroyRemoveEmails": true}))
        .await
        .unwrap();
    assert_eq!(done["destroyed"], json!([box_id]));
    assert_eq!(mock.email_count(), 0);
}

#[tokio::test]
async fn import_threads_replies_and_rejects_markers() {
    let mock = MockAccount::new().with_rejected_import("X-Reject");
    let inbox = mock.mailbox_id("Inbox").unwrap();
    let mut threads = Vec::new();
    for raw in [
        "Message-ID: <one@t>\r\nSubject: one\r\n\r\nx",
        "Message-ID: <two@t>\r\nIn-Reply-To: <one@t>\r\nSubject: two\r\n\r\nx",
    ] {
        let up = mock.upload(raw.as_bytes().to_vec(), "message/rfc822", None).await.unwrap();
        let resp = mock
            .call(
                "Email/import",
                json!({"accountId": "A1", "emails": {"e": {"blobId": up.blob_id, "mailboxIds": {&inbox: true}}}}),
            )
            .await
            .unwrap();
        threads.push(resp["created"]["e"]["threadId"].clone());
    }
    assert_eq!(threads[0], threads[1]);

    let bad = mock
        .upload(b"X-Reject: yes\r\n\r\nx".to_vec(), "message/rfc822", None)
        .await
        .unwrap();
    let resp = mock
        .call(
            "Email/import",
            json!({"accountId": "A1", "emails": {"e": {"blobId": bad.blob_id, "mailboxIds": {&inbox: true}}}}),
        )
        .await
        .unwrap();
    assert_eq!(resp["notCreated"]["e"]["type"], "invalidEmail");
}

#[tokio::test]
async fn changes_report_created_and_destroyed_emails() {
    let mock = MockAccount::new().with_emails(1);
    let before = mock
        .call("Email/get", json!({"accountId": "A1", "ids": []}))
        .await
        .unwrap()["state"]
        .clone();
    let inbox = mock.mailbox_id("Inbox").unwrap();
    let up = mock
        .upload(b"Subject: late\r\n\r\nx".to_vec(), "message/rfc822", None)
        .await
        .unwrap();
    let imported = mock
        .call(
            "Email/import",
            json!({"accountId": "A1", "emails": {"e": {"blobId": up.blob_id, "mailboxIds": {&inbox: true}}}}),
        )
        .await
        .unwrap();
    let id = imported["created"]["e"]["id"].clone();
    let changes = mock
        .call("Email/changes", json!({"accountId": "A1", "sinceState": before}))
        .await
        .unwrap();
    assert_eq!(changes["created"], json!([id]));
    assert_eq!(changes["hasMoreChanges"], false);

    let gone = mock
        .call("Email/changes", json!({"accountId": "A1", "sinceState": "s999"}))
        .await
        .unwrap_err();
    assert_eq!(gone.method_error_type(), Some("cannotCalculateChanges"));
}

// ── Push ────────────────────────────────────────────────────────────

#[tokio::test]
async fn event_source_pushes_state_changes() {
    let mock = MockAccount::new();
    let mut events = mock.event_source("*", "no", 0).await.unwrap();
    assert_eq!(events.status(), 200);
    assert_eq!(events.content_type(), "text/event-stream");
    let first = events.next_named("state", WAIT).await.unwrap();
    let doc: Value = serde_json::from_str(&first.data).unwrap();
    assert_eq!(doc["@type"], "StateChange");
    assert!(doc["changed"]["A1"]["Email"].is_string());

    mock.call(
        "Mailbox/set",
        json!({"accountId": "A1", "create": {"m": {"name": "Pushed"}}}),
    )
    .await
    .unwrap();
    let next = events.next_named("state", WAIT).await.unwrap();
    let doc: Value = serde_json::from_str(&next.data).unwrap();
    assert!(doc["changed"]["A1"]["Mailbox"].is_string());
    assert!(doc["changed"]["A1"].get("Email").is_none());
}

#[tokio::test]
async fn event_source_filters_types_and_closes_after_state() {
    let mock = MockAccount::new();
    let mut events = mock.event_source("Email", "state", 0).await.unwrap();
    let first = events.next_named("state", WAIT).await.unwrap();
    let doc: Value = serde_json::from_str(&first.data).unwrap();
    let changed = doc["changed"]["A1"].as_object().unwrap();
    assert_eq!(changed.keys().collect::<Vec<_>>(), vec!["Email"]);
    assert!(events.next_frame(WAIT).await.is_none());
    assert!(events.is_finished());
}

// ── Binary data ─────────────────────────────────────────────────────

#[tokio::test]
async fn upload_then_download_round_trips_bytes() {
    let mock = MockAccount::new();
    let up = mock.upload(vec![0, 159, 146, 150], "image/jpeg", None).await.unwrap();
    assert_eq!(up.size, 4);
    let down = mock.download(&up.blob_id, "image/jpeg", "a.jpg", None).await.unwrap();
    assert_eq!(down.status, 200);
    assert_eq!(down.body, vec![0, 159, 146, 150]);
    assert_eq!(down.header("content-type"), Some("image/jpeg"));

    let missing = mock.download("nope", "", "x", None).await.unwrap();
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn upload_to_foreign_account_fails() {
    let mock = MockAccount::new();
    let err = mock.upload(vec![1], "text/plain", Some("other")).await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 404, .. }));
}
