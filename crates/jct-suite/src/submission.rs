// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::{needs_identity, needs_recipient, needs_submission};
use crate::support::{
    created_id, destroy_emails, ensure_changes_shape, first, get_state, id_set, set_error_type,
    strings,
};
use jct_core::Invocation;
use jct_runtime::assertions::{
    array, ensure, ensure_eq, ensure_includes, ensure_len, ensure_type, string,
};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Value, json};

const MISSING: &str = "nonexistent-submission-xyz";

/// Checks in the `submission` category.
pub fn checks() -> Vec<TestDescriptor> {
    let get = Group::new("submission", "RFC8621", "7.1");
    let changes = Group::new("submission", "RFC8621", "7.2");
    let query = Group::new("submission", "RFC8621", "7.3");
    let set = Group::new("submission", "RFC8621", "7.5");
    vec![
        get.define("get-empty", "EmailSubmission/get succeeds on a fresh account", get_empty)
            .skip_if(needs_submission),
        get.define("get-not-found", "Unknown submission ids are reported in notFound", get_not_found)
            .skip_if(needs_submission),
        get.define("get-response-structure", "EmailSubmission/get has the standard /get shape", get_response_structure)
            .rfc("RFC8620")
            .section("5.1")
            .skip_if(needs_submission),
        changes.define("changes-no-changes", "EmailSubmission/changes from the current state is empty", changes_no_changes)
            .skip_if(needs_submission),
        changes.define("changes-response-structure", "EmailSubmission/changes returns the standard shape", changes_response_structure)
            .rfc("RFC8620")
            .section("5.2")
            .skip_if(needs_submission),
        query.define("query-all", "EmailSubmission/query without a filter succeeds", query_all)
            .skip_if(needs_submission),
        query.define("query-filter-undo-status", "EmailSubmission/query filters on undoStatus", query_filter_undo_status)
            .skip_if(needs_submission),
        query.define("query-response-structure", "EmailSubmission/query returns the standard shape", query_response_structure)
            .rfc("RFC8620")
            .section("5.5")
            .skip_if(needs_submission),
        set.define("set-create-submission", "EmailSubmission/set sends a draft", set_create_submission)
            .skip_if(needs_recipient),
        set.define("set-create-with-envelope", "An explicit envelope is used as given", set_create_with_envelope)
            .skip_if(needs_recipient),
        set.define("set-on-success-update-email", "onSuccessUpdateEmail files the sent draft", set_on_success_update_email)
            .skip_if(needs_recipient),
        set.define("set-submission-properties", "A created submission carries the standard properties", set_submission_properties)
            .section("7")
            .skip_if(needs_recipient),
        set.define("set-no-recipients-error", "A draft without recipients cannot be submitted", set_no_recipients_error)
            .skip_if(needs_identity),
    ]
}

body!(get_empty, |ctx| {
    let resp = ctx.call("EmailSubmission/get", json!({ "ids": null })).await?;
    array(&resp["list"], "list")?;
    Ok(())
});

body!(get_not_found, |ctx| {
    let resp = ctx.call("EmailSubmission/get", json!({ "ids": [MISSING] })).await?;
    ensure_len(array(&resp["list"], "list")?, 0, None)?;
    ensure_includes(&strings(&resp["notFound"]), &MISSING.to_string(), None)?;
    Ok(())
});

body!(get_response_structure, |ctx| {
    let resp = ctx.call("EmailSubmission/get", json!({ "ids": [] })).await?;
    ensure_type(&resp["accountId"], "string", None)?;
    ensure_type(&resp["state"], "string", None)?;
    ensure_type(&resp["list"], "array", None)?;
    ensure_type(&resp["notFound"], "array", None)?;
    Ok(())
});

// ── EmailSubmission/changes ─────────────────────────────────────────

async fn changes_since(ctx: &RunContext, since: &str) -> anyhow::Result<Value> {
    Ok(ctx
        .call("EmailSubmission/changes", json!({ "sinceState": since }))
        .await?)
}

body!(changes_no_changes, |ctx| {
    let state = get_state(ctx, "EmailSubmission").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_eq(&resp["oldState"], &json!(state), None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_len(array(&resp[list], list)?, 0, None)?;
    }
    Ok(())
});

body!(changes_response_structure, |ctx| {
    let state = get_state(ctx, "EmailSubmission").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_changes_shape(&resp)?;
    Ok(())
});

// ── EmailSubmission/query ───────────────────────────────────────────

body!(query_all, |ctx| {
    let resp = ctx.call("EmailSubmission/query", json!({})).await?;
    ensure_type(&resp["queryState"], "string", None)?;
    ensure_type(&resp["ids"], "array", None)?;
    Ok(())
});

body!(query_filter_undo_status, |ctx| {
    let resp = ctx
        .call("EmailSubmission/query", json!({ "filter": { "undoStatus": "final" } }))
        .await?;
    ensure_type(&resp["ids"], "array", None)?;
    Ok(())
});

body!(query_response_structure, |ctx| {
    let resp = ctx.call("EmailSubmission/query", json!({})).await?;
    ensure_type(&resp["accountId"], "string", None)?;
    ensure_type(&resp["queryState"], "string", None)?;
    ensure_type(&resp["canCalculateChanges"], "boolean", None)?;
    ensure_type(&resp["position"], "number", None)?;
    ensure_type(&resp["ids"], "array", None)?;
    Ok(())
});

// ── EmailSubmission/set ─────────────────────────────────────────────

/// Mailbox drafts are filed in: the drafts role, else the inbox.
fn drafts_mailbox(ctx: &RunContext) -> anyhow::Result<String> {
    Ok(ctx.role("drafts").or_else(|_| ctx.role("inbox"))?.to_string())
}

/// Create a draft from the first identity, to `to` when given.
async fn create_draft(ctx: &RunContext, subject: &str, to: Option<&str>) -> anyhow::Result<String> {
    let from = ctx
        .identity_email
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no identity address"))?;
    let mailbox = drafts_mailbox(ctx)?;
    let mut draft = json!({
        "mailboxIds": id_set([mailbox.as_str()]),
        "keywords": { "$seen": true, "$draft": true },
        "from": [{ "name": "Conformance", "email": from }],
        "subject": subject,
        "bodyStructure": { "type": "text/plain", "partId": "1" },
        "bodyValues": { "1": { "value": "Sent by the conformance run." } },
    });
    if let Some(to) = to {
        draft["to"] = json!([{ "name": "Secondary", "email": to }]);
    }
    let resp = ctx.call("Email/set", json!({ "create": { "draft": draft } })).await?;
    Ok(created_id(&resp, "draft")?)
}

fn recipient(ctx: &RunContext) -> anyhow::Result<String> {
    ctx.secondary_email
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no secondary address"))
}

async fn submit(ctx: &RunContext, email_id: &str, envelope: Option<Value>) -> anyhow::Result<Value> {
    let mut submission = json!({ "identityId": ctx.identity_ids[0], "emailId": email_id });
    if let Some(envelope) = envelope {
        submission["envelope"] = envelope;
    }
    Ok(ctx
        .call("EmailSubmission/set", json!({ "create": { "sub": submission } }))
        .await?)
}

/// Remove the draft and, when one was created, its submission record.
async fn cleanup(ctx: &RunContext, email_id: &str, submission: Option<&str>) -> anyhow::Result<()> {
    if let Some(id) = submission {
        ctx.call("EmailSubmission/set", json!({ "destroy": [id] })).await?;
    }
    destroy_emails(ctx, &[email_id]).await
}

body!(set_create_submission, |ctx| {
    let to = recipient(ctx)?;
    let email_id = create_draft(ctx, "Submission check", Some(&to)).await?;
    let resp = submit(ctx, &email_id, None).await;
    let submission = resp.as_ref().ok().and_then(|r| created_id(r, "sub").ok());
    cleanup(ctx, &email_id, submission.as_deref()).await?;
    let resp = resp?;
    created_id(&resp, "sub")?;
    let created = &resp["created"]["sub"];
    ensure_type(&created["sendAt"], "string", None)?;
    let undo = string(&created["undoStatus"], "undoStatus")?;
    ensure(
        matches!(undo, "pending" | "final"),
        format!("undoStatus must be pending or final, got {undo}"),
    )?;
    Ok(())
});

body!(set_create_with_envelope, |ctx| {
    let to = recipient(ctx)?;
    let from = ctx.identity_email.clone().unwrap_or_default();
    let email_id = create_draft(ctx, "Envelope check", Some(&to)).await?;
    let envelope = json!({
        "mailFrom": { "email": from, "parameters": null },
        "rcptTo": [{ "email": to, "parameters": null }],
    });
    let resp = submit(ctx, &email_id, Some(envelope)).await;
    let submission = resp.as_ref().ok().and_then(|r| created_id(r, "sub").ok());
    let fetched = match &submission {
        Some(id) => Some(ctx.call("EmailSubmission/get", json!({ "ids": [id] })).await),
        None => None,
    };
    cleanup(ctx, &email_id, submission.as_deref()).await?;
    created_id(&resp?, "sub")?;
    if let Some(fetched) = fetched {
        let fetched = fetched?;
        let record = first(&fetched, "EmailSubmission/get")?;
        let rcpt: Vec<String> = array(&record["envelope"]["rcptTo"], "rcptTo")?
            .iter()
            .filter_map(|r| r["email"].as_str().map(str::to_string))
            .collect();
        ensure_includes(&rcpt, &to, None)?;
    }
    Ok(())
});

body!(set_on_success_update_email, |ctx| {
    let to = recipient(ctx)?;
    let sent = ctx.role("sent")?.to_string();
    let drafts = drafts_mailbox(ctx)?;
    let email_id = create_draft(ctx, "onSuccess check", Some(&to)).await?;
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![Invocation::new(
                "EmailSubmission/set",
                json!({
                    "accountId": ctx.account_id,
                    "create": { "sub": { "identityId": ctx.identity_ids[0], "emailId": email_id } },
                    "onSuccessUpdateEmail": {
                        "#sub": {
                            format!("mailboxIds/{sent}"): true,
                            format!("mailboxIds/{drafts}"): null,
                            "keywords/$draft": null,
                        }
                    },
                }),
                "submit",
            )],
        )
        .await;
    let fetched = ctx
        .call("Email/get", json!({ "ids": [email_id], "properties": ["mailboxIds", "keywords"] }))
        .await;
    let submission = resp.as_ref().ok().and_then(|r| {
        r.by_call_id("submit")
            .and_then(|i| i.args()["created"]["sub"]["id"].as_str().map(str::to_string))
    });
    cleanup(ctx, &email_id, submission.as_deref()).await?;
    let resp = resp?;
    let names: Vec<&str> = resp.method_responses.iter().map(|i| i.name()).collect();
    ensure_eq(&names, &vec!["EmailSubmission/set", "Email/set"], Some("the implicit Email/set follows"))?;
    let fetched = fetched?;
    let email = first(&fetched, "Email/get")?;
    ensure_eq(&email["mailboxIds"][sent.as_str()], &json!(true), Some("the email is filed in sent"))?;
    ensure(email["mailboxIds"].get(drafts.as_str()).is_none(), "the email left drafts")?;
    ensure(email["keywords"].get("$draft").is_none(), "$draft is removed")?;
    Ok(())
});

body!(set_submission_properties, |ctx| {
    let to = recipient(ctx)?;
    let email_id = create_draft(ctx, "Submission properties check", Some(&to)).await?;
    let resp = submit(ctx, &email_id, None).await;
    let submission = resp.as_ref().ok().and_then(|r| created_id(r, "sub").ok());
    let fetched = match &submission {
        Some(id) => Some(ctx.call("EmailSubmission/get", json!({ "ids": [id] })).await),
        None => None,
    };
    cleanup(ctx, &email_id, submission.as_deref()).await?;
    let id = created_id(&resp?, "sub")?;
    let fetched = fetched.ok_or_else(|| anyhow::anyhow!("submission {id} was not fetched"))??;
    let record = first(&fetched, "EmailSubmission/get")?;
    ensure_eq(&record["id"], &json!(id), None)?;
    ensure_eq(&record["identityId"], &json!(ctx.identity_ids[0]), None)?;
    ensure_eq(&record["emailId"], &json!(email_id), None)?;
    for key in ["threadId", "sendAt", "undoStatus"] {
        ensure_type(&record[key], "string", Some(key))?;
    }
    ensure_type(&record["envelope"], "object", None)?;
    Ok(())
});

body!(set_no_recipients_error, |ctx| {
    let email_id = create_draft(ctx, "No recipients", None).await?;
    let resp = submit(ctx, &email_id, None).await;
    let submission = resp.as_ref().ok().and_then(|r| created_id(r, "sub").ok());
    cleanup(ctx, &email_id, submission.as_deref()).await?;
    let kind = set_error_type(&resp?, "notCreated", "sub")?.to_string();
    ensure(!kind.is_empty(), "the refusal carries a SetError type")?;
    Ok(())
});
