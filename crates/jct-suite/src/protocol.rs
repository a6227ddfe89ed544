// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::support::{expect_method_error, strings};
use jct_core::{CAP_CORE, CAP_MAIL, Invocation, ResultReference};
use jct_runtime::assertions::{
    array, ensure, ensure_contains, ensure_deep_eq, ensure_eq, ensure_gt, ensure_has_property,
    ensure_includes, ensure_len, ensure_type, is_truthy,
};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Value, json};

/// Checks in the `core` category.
pub fn checks() -> Vec<TestDescriptor> {
    let session = Group::new("core", "RFC8620", "2");
    let echo = Group::new("core", "RFC8620", "4");
    let errors = Group::new("core", "RFC8620", "3.6.1");
    let method_errors = Group::new("core", "RFC8620", "3.6.2");
    let references = Group::new("core", "RFC8620", "3.7");
    vec![
        session.define("session-has-capabilities", "Session resource has capabilities object", session_has_capabilities),
        session.define("session-has-core-capability", "Session advertises urn:ietf:params:jmap:core", session_has_core_capability),
        session.define("session-has-mail-capability", "Session advertises urn:ietf:params:jmap:mail", session_has_mail_capability),
        session.define("session-core-capability-properties", "Core capability has required properties", session_core_capability_properties),
        session.define("session-accounts-present", "Session has accounts object with at least one account", session_accounts_present),
        session.define("session-account-properties", "Account objects have required properties", session_account_properties),
        session.define("session-primary-accounts", "Session has primaryAccounts with mail account", session_primary_accounts),
        session.define("session-username", "Session has username string", session_username),
        session.define("session-download-url-template", "Session downloadUrl contains template variables", session_download_url_template),
        session.define("session-upload-url", "Session has uploadUrl with accountId template", session_upload_url),
        session.define("session-event-source-url", "Session has eventSourceUrl with template variables", session_event_source_url),
        session.define("session-state", "Session has state string", session_state),
        echo.define("echo-basic", "Core/echo returns same arguments", echo_basic),
        echo.define("echo-empty", "Core/echo with empty arguments", echo_empty),
        echo.define("echo-nested", "Core/echo with nested complex arguments", echo_nested),
        errors.define("error-not-json", "Server returns error for non-JSON body", error_not_json),
        errors.define("error-not-request", "Server MUST return 400 for JSON that is not a valid Request", error_not_request),
        errors.define("error-unknown-capability", "Server MUST return HTTP-level error for unknown capability in using", error_unknown_capability),
        errors.define("error-empty-using", "Empty using rejects each method with unknownMethod", error_empty_using),
        errors.define("error-wrong-content-type", "Server returns error for wrong Content-Type", error_wrong_content_type),
        errors.define("error-method-calls-not-array", "Server returns error when methodCalls is not an array", error_method_calls_not_array),
        method_errors.define("error-unknown-method", "Unknown method name returns unknownMethod error", error_unknown_method),
        method_errors.define("error-invalid-arguments-missing-account", "Missing accountId on Mailbox/get returns invalidArguments", error_invalid_arguments_missing_account),
        method_errors.define("error-account-not-found", "Unknown accountId returns accountNotFound", error_account_not_found),
        method_errors.define("error-invalid-arguments-bad-type", "Wrongly typed arguments return invalidArguments", error_invalid_arguments_bad_type),
        method_errors.define("error-method-level-has-type", "Method-level errors carry a type property", error_method_level_has_type),
        method_errors.define("error-state-mismatch", "A stale ifInState returns stateMismatch", error_state_mismatch)
            .section("5.3"),
        method_errors.define("error-multiple-method-responses", "One response per method call, in order", error_multiple_method_responses)
            .section("3.4"),
        method_errors.define("error-response-has-session-state", "API responses carry sessionState", error_response_has_session_state)
            .section("3.4"),
        references.define("error-invalid-result-reference", "Unresolvable back-reference returns invalidResultReference", error_invalid_result_reference),
        references.define("result-reference-ids", "Result reference feeds query ids into a get", result_reference_ids),
        references.define("result-ref-simple", "Mailbox ids flow from one Mailbox/get into another", result_ref_simple),
        references.define("result-ref-wrong-method-name", "A reference naming the wrong method is rejected", result_ref_wrong_method_name),
        references.define("result-ref-path-single-value", "A reference path may select a single value", result_ref_path_single_value),
        references.define("result-ref-call-id-preserved", "Call ids are echoed in order", result_ref_call_id_preserved),
    ]
}

// ── Session ─────────────────────────────────────────────────────────

body!(session_has_capabilities, |ctx| {
    let caps = &ctx.session.raw["capabilities"];
    ensure_type(caps, "object", None)?;
    ensure_gt(
        caps.as_object().map_or(0, |m| m.len()),
        0,
        Some("capabilities must not be empty"),
    )?;
    Ok(())
});

body!(session_has_core_capability, |ctx| {
    ensure(is_truthy(&ctx.session.raw["capabilities"][CAP_CORE]), "Must have core capability")?;
    Ok(())
});

body!(session_has_mail_capability, |ctx| {
    ensure(is_truthy(&ctx.session.raw["capabilities"][CAP_MAIL]), "Must have mail capability")?;
    Ok(())
});

body!(session_core_capability_properties, |ctx| {
    let core = &ctx.session.raw["capabilities"][CAP_CORE];
    for key in [
        "maxSizeUpload",
        "maxConcurrentUpload",
        "maxSizeRequest",
        "maxConcurrentRequests",
        "maxCallsInRequest",
        "maxObjectsInGet",
        "maxObjectsInSet",
    ] {
        let message = format!("{key} must be a number");
        ensure_type(&core[key], "number", Some(message.as_str()))?;
    }
    ensure_type(
        &core["collationAlgorithms"],
        "array",
        Some("collationAlgorithms must be an array"),
    )?;
    Ok(())
});

body!(session_accounts_present, |ctx| {
    let accounts = &ctx.session.raw["accounts"];
    ensure_type(accounts, "object", None)?;
    ensure_gt(
        accounts.as_object().map_or(0, |m| m.len()),
        0,
        Some("Must have at least one account"),
    )?;
    Ok(())
});

body!(session_account_properties, |ctx| {
    let account = &ctx.session.raw["accounts"][ctx.account_id.as_str()];
    ensure(account.is_object(), "Primary account must exist")?;
    ensure_type(&account["name"], "string", None)?;
    ensure_type(&account["isPersonal"], "boolean", None)?;
    ensure_type(&account["isReadOnly"], "boolean", None)?;
    ensure_type(&account["accountCapabilities"], "object", None)?;
    Ok(())
});

body!(session_primary_accounts, |ctx| {
    let primary = &ctx.session.raw["primaryAccounts"];
    ensure_type(primary, "object", None)?;
    ensure_eq(
        &primary[CAP_MAIL],
        &json!(ctx.account_id),
        Some("primary mail account must match the account under test"),
    )?;
    Ok(())
});

body!(session_username, |ctx| {
    let username = &ctx.session.raw["username"];
    ensure_type(username, "string", None)?;
    ensure(is_truthy(username), "username must not be empty")?;
    Ok(())
});

body!(session_download_url_template, |ctx| {
    let url = &ctx.session.download_url;
    for var in ["{accountId}", "{blobId}", "{name}", "{type}"] {
        ensure_contains(url, var, None)?;
    }
    Ok(())
});

body!(session_upload_url, |ctx| {
    ensure_contains(&ctx.session.upload_url, "{accountId}", None)?;
    Ok(())
});

body!(session_event_source_url, |ctx| {
    let url = &ctx.session.event_source_url;
    for var in ["{types}", "{closeafter}", "{ping}"] {
        ensure_contains(url, var, None)?;
    }
    Ok(())
});

body!(session_state, |ctx| {
    let state = &ctx.session.raw["state"];
    ensure_type(state, "string", None)?;
    ensure(is_truthy(state), "state must not be empty")?;
    Ok(())
});

// ── Core/echo ───────────────────────────────────────────────────────

body!(echo_basic, |ctx| {
    let result = ctx.client.call("Core/echo", json!({ "hello": "world", "number": 42 })).await?;
    ensure_eq(&result["hello"], &json!("world"), None)?;
    ensure_eq(&result["number"], &json!(42), None)?;
    Ok(())
});

body!(echo_empty, |ctx| {
    let result = ctx.client.call("Core/echo", json!({})).await?;
    ensure_deep_eq(&result, &json!({}), None)?;
    Ok(())
});

body!(echo_nested, |ctx| {
    let args = json!({
        "string": "test",
        "number": 42,
        "bool": true,
        "null": null,
        "array": [1, "two", false],
        "object": { "nested": { "deep": "value" } }
    });
    let result = ctx.client.call("Core/echo", args.clone()).await?;
    ensure_deep_eq(&result, &args, None)?;
    Ok(())
});

// ── Request-level errors ────────────────────────────────────────────

fn ensure_client_error(status: u16) -> anyhow::Result<()> {
    ensure(
        (400..500).contains(&status),
        format!("Expected 4xx client error, got {status}"),
    )?;
    Ok(())
}

body!(error_not_json, |ctx| {
    let resp = ctx.client.raw_post("this is not json".into(), "application/json").await?;
    ensure_client_error(resp.status)
});

body!(error_not_request, |ctx| {
    let resp = ctx
        .client
        .raw_post(json!({ "foo": "bar" }).to_string(), "application/json")
        .await?;
    ensure_client_error(resp.status)
});

body!(error_unknown_capability, |ctx| {
    let body = json!({
        "using": [CAP_CORE, "urn:example:nonexistent"],
        "methodCalls": [["Core/echo", {}, "c0"]]
    });
    let resp = ctx.client.raw_post(body.to_string(), "application/json").await?;
    ensure_client_error(resp.status)?;
    let problem: Value = serde_json::from_slice(&resp.body).unwrap_or_default();
    ensure_contains(
        problem["type"].as_str().unwrap_or_default(),
        "unknownCapability",
        Some("problem type must be urn:ietf:params:jmap:error:unknownCapability"),
    )?;
    Ok(())
});

body!(error_unknown_method, |ctx| {
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![Invocation::new("Nonexistent/method", json!({}), "c0")],
        )
        .await?;
    ensure_len(&resp.method_responses, 1, None)?;
    let reply = &resp.method_responses[0];
    ensure_eq(&reply.name(), &"error", None)?;
    ensure_eq(&reply.args()["type"], &json!("unknownMethod"), None)?;
    ensure_eq(&reply.call_id(), &"c0", Some("error must echo the call id"))?;
    Ok(())
});

body!(error_invalid_result_reference, |ctx| {
    let reference = ResultReference::new("missing", "Email/query", "/ids");
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![Invocation::new(
                "Email/get",
                json!({ "accountId": ctx.account_id, "#ids": reference.to_value() }),
                "c0",
            )],
        )
        .await?;
    let reply = &resp.method_responses[0];
    ensure_eq(&reply.name(), &"error", None)?;
    ensure_eq(&reply.args()["type"], &json!("invalidResultReference"), None)?;
    Ok(())
});

body!(result_reference_ids, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let reference = ResultReference::new("q", "Email/query", "/ids");
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![
                Invocation::new(
                    "Email/query",
                    json!({ "accountId": ctx.account_id, "filter": { "inMailbox": inbox }, "limit": 5 }),
                    "q",
                ),
                Invocation::new(
                    "Email/get",
                    json!({ "accountId": ctx.account_id, "#ids": reference.to_value(), "properties": ["id"] }),
                    "g",
                ),
            ],
        )
        .await?;
    ensure_len(&resp.method_responses, 2, None)?;
    let query_ids = strings(&resp.method_responses[0].args()["ids"]);
    let got = resp
        .by_call_id("g")
        .ok_or_else(|| anyhow::anyhow!("no response for call g"))?;
    ensure_eq(&got.name(), &"Email/get", None)?;
    let got_ids: Vec<String> = got.args()["list"]
        .as_array()
        .map(|list| list.iter().filter_map(|e| e["id"].as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    ensure_len(&got_ids, query_ids.len(), None)?;
    for id in &query_ids {
        ensure_includes(&got_ids, id, None)?;
    }
    Ok(())
});

body!(error_empty_using, |ctx| {
    let resp = ctx
        .client
        .raw_request(Vec::new(), vec![Invocation::new("Core/echo", json!({}), "c0")])
        .await?;
    let reply = &resp.method_responses[0];
    ensure_eq(&reply.name(), &"error", Some("with empty using the call must fail"))?;
    ensure_eq(&reply.args()["type"], &json!("unknownMethod"), None)?;
    Ok(())
});

body!(error_wrong_content_type, |ctx| {
    let body = json!({ "using": [CAP_CORE], "methodCalls": [["Core/echo", {}, "c0"]] });
    let resp = ctx.client.raw_post(body.to_string(), "text/plain").await?;
    ensure_client_error(resp.status)
});

body!(error_method_calls_not_array, |ctx| {
    let body = json!({ "using": [CAP_CORE], "methodCalls": "not-an-array" });
    let resp = ctx.client.raw_post(body.to_string(), "application/json").await?;
    ensure_client_error(resp.status)
});

// ── Method-level errors ─────────────────────────────────────────────

/// Send one call with the default capabilities and return the reply's
/// name and arguments.
async fn single_reply(ctx: &RunContext, method: &str, args: Value) -> anyhow::Result<(String, Value)> {
    let resp = ctx
        .client
        .raw_request(ctx.client.default_using(), vec![Invocation::new(method, args, "c0")])
        .await?;
    let reply = resp
        .method_responses
        .first()
        .ok_or_else(|| anyhow::anyhow!("no method response"))?;
    Ok((reply.name().to_string(), reply.args().clone()))
}

async fn expect_error_reply(ctx: &RunContext, method: &str, args: Value, expected: &str) -> anyhow::Result<()> {
    let (name, args) = single_reply(ctx, method, args).await?;
    ensure_eq(&name.as_str(), &"error", None)?;
    ensure_eq(&args["type"], &json!(expected), None)?;
    Ok(())
}

body!(error_invalid_arguments_missing_account, |ctx| {
    expect_error_reply(ctx, "Mailbox/get", json!({}), "invalidArguments").await
});

body!(error_account_not_found, |ctx| {
    let args = json!({ "accountId": "nonexistent-account-id-xyz" });
    expect_error_reply(ctx, "Mailbox/get", args, "accountNotFound").await
});

body!(error_invalid_arguments_bad_type, |ctx| {
    let args = json!({ "accountId": ctx.account_id, "ids": "not-an-array" });
    expect_error_reply(ctx, "Mailbox/get", args, "invalidArguments").await
});

body!(error_method_level_has_type, |ctx| {
    let resp = ctx
        .client
        .raw_request(vec![CAP_CORE.into()], vec![Invocation::new("Fake/method", json!({}), "c0")])
        .await?;
    let reply = &resp.method_responses[0];
    ensure_eq(&reply.name(), &"error", None)?;
    ensure_has_property(reply.args(), "type", None)?;
    Ok(())
});

body!(error_state_mismatch, |ctx| {
    let result = ctx
        .client
        .call(
            "Mailbox/set",
            json!({
                "accountId": ctx.account_id,
                "ifInState": "invalid-state-that-does-not-exist",
                "update": {},
            }),
        )
        .await;
    expect_method_error(result, "stateMismatch")
});

body!(error_multiple_method_responses, |ctx| {
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![
                Invocation::new("Mailbox/get", json!({ "accountId": ctx.account_id, "ids": [] }), "call1"),
                Invocation::new("Core/echo", json!({ "test": true }), "call2"),
                Invocation::new("Fake/nonexistent", json!({}), "call3"),
            ],
        )
        .await?;
    ensure_len(&resp.method_responses, 3, None)?;
    let ids: Vec<&str> = resp.method_responses.iter().map(Invocation::call_id).collect();
    ensure_eq(&ids, &vec!["call1", "call2", "call3"], None)?;
    ensure_eq(&resp.method_responses[2].name(), &"error", None)?;
    Ok(())
});

body!(error_response_has_session_state, |ctx| {
    let resp = ctx
        .client
        .raw_request(vec![CAP_CORE.into()], vec![Invocation::new("Core/echo", json!({}), "c0")])
        .await?;
    ensure(!resp.session_state.is_empty(), "Response must include sessionState")?;
    Ok(())
});

// ── Result references ───────────────────────────────────────────────

body!(result_ref_simple, |ctx| {
    let reference = ResultReference::new("getMailboxes", "Mailbox/get", "/list/*/id");
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![
                Invocation::new("Mailbox/get", json!({ "accountId": ctx.account_id, "ids": null }), "getMailboxes"),
                Invocation::new(
                    "Mailbox/get",
                    json!({ "accountId": ctx.account_id, "#ids": reference.to_value() }),
                    "getById",
                ),
            ],
        )
        .await?;
    ensure_len(&resp.method_responses, 2, None)?;
    let all = array(&resp.method_responses[0].args()["list"], "list")?.len();
    let second = &resp.method_responses[1];
    ensure_eq(&second.name(), &"Mailbox/get", None)?;
    let resolved = array(&second.args()["list"], "list")?.len();
    ensure_gt(resolved, 0, Some("Should have resolved mailbox ids"))?;
    ensure_eq(&resolved, &all, None)?;
    Ok(())
});

body!(result_ref_wrong_method_name, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let reference = ResultReference::new("query", "Mailbox/get", "/ids");
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![
                Invocation::new(
                    "Email/query",
                    json!({ "accountId": ctx.account_id, "filter": { "inMailbox": inbox }, "limit": 1 }),
                    "query",
                ),
                Invocation::new(
                    "Email/get",
                    json!({ "accountId": ctx.account_id, "#ids": reference.to_value() }),
                    "get",
                ),
            ],
        )
        .await?;
    ensure_len(&resp.method_responses, 2, None)?;
    let reply = &resp.method_responses[1];
    ensure_eq(&reply.name(), &"error", None)?;
    ensure_eq(&reply.args()["type"], &json!("invalidResultReference"), None)?;
    Ok(())
});

body!(result_ref_path_single_value, |ctx| {
    let reference = ResultReference::new("getState", "Mailbox/get", "/state");
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![
                Invocation::new("Mailbox/get", json!({ "accountId": ctx.account_id, "ids": [] }), "getState"),
                Invocation::new(
                    "Mailbox/changes",
                    json!({ "accountId": ctx.account_id, "#sinceState": reference.to_value() }),
                    "changes",
                ),
            ],
        )
        .await?;
    ensure_len(&resp.method_responses, 2, None)?;
    let changes = &resp.method_responses[1];
    ensure_eq(&changes.name(), &"Mailbox/changes", None)?;
    ensure_type(&changes.args()["oldState"], "string", None)?;
    ensure_type(&changes.args()["newState"], "string", None)?;
    Ok(())
});

body!(result_ref_call_id_preserved, |ctx| {
    let calls = ["first", "second", "third"]
        .iter()
        .enumerate()
        .map(|(n, id)| Invocation::new("Core/echo", json!({ "value": n + 1 }), *id))
        .collect();
    let resp = ctx.client.raw_request(vec![CAP_CORE.into()], calls).await?;
    let ids: Vec<&str> = resp.method_responses.iter().map(Invocation::call_id).collect();
    ensure_eq(&ids, &vec!["first", "second", "third"], None)?;
    Ok(())
});
