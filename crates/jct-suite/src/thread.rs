// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::support::{
    create_email, destroy_emails, ensure_changes_shape, first, get_state, plain_email, strings,
};
use jct_runtime::assertions::{array, ensure_eq, ensure_gt, ensure_includes, ensure_len, string};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::json;

const CONVERSATION: [&str; 3] = ["thread-starter", "thread-reply-1", "thread-reply-2"];

/// Checks in the `thread` category.
pub fn checks() -> Vec<TestDescriptor> {
    let thread = Group::new("thread", "RFC8621", "3");
    let changes = Group::new("thread", "RFC8621", "3.2");
    vec![
        thread.define("replies-share-thread", "Replies are placed in the starter's thread", replies_share_thread),
        thread.define("get-thread-by-id", "Thread/get returns every email of a conversation", get_thread_by_id)
            .section("3.1"),
        thread.define("get-email-ids-order", "Thread emailIds are sorted oldest first", get_email_ids_order)
            .section("3.1"),
        thread.define("get-single-email-thread", "An unrelated email has a thread of its own", get_single_email_thread)
            .section("3.1"),
        thread.define("get-not-found", "Unknown thread ids are reported in notFound", get_not_found)
            .section("3.1"),
        changes.define("changes-no-changes", "Thread/changes from the current state is empty", changes_no_changes),
        changes.define("changes-after-new-email", "A new conversation is reported as a created thread", changes_after_new_email),
        changes.define("changes-after-email-destroy", "Removing a thread's last email destroys the thread", changes_after_email_destroy),
        changes.define("changes-response-structure", "Thread/changes has the standard /changes shape", changes_response_structure)
            .rfc("RFC8620")
            .section("5.2"),
    ]
}

async fn thread_of(ctx: &RunContext, key: &str) -> anyhow::Result<String> {
    let id = ctx.email(key)?.to_string();
    let resp = ctx
        .call("Email/get", json!({ "ids": [id], "properties": ["threadId"] }))
        .await?;
    Ok(string(&first(&resp, "Email/get")?["threadId"], "threadId")?.to_string())
}

async fn thread_emails(ctx: &RunContext, thread_id: &str) -> anyhow::Result<Vec<String>> {
    let resp = ctx.call("Thread/get", json!({ "ids": [thread_id] })).await?;
    let thread = first(&resp, "Thread/get")?;
    ensure_eq(&thread["id"], &json!(thread_id), None)?;
    Ok(strings(&thread["emailIds"]))
}

body!(replies_share_thread, |ctx| {
    let starter = thread_of(ctx, CONVERSATION[0]).await?;
    for key in &CONVERSATION[1..] {
        let message = format!("{key} must share the starter's thread");
        ensure_eq(&thread_of(ctx, key).await?, &starter, Some(message.as_str()))?;
    }
    Ok(())
});

body!(get_thread_by_id, |ctx| {
    let thread_id = thread_of(ctx, CONVERSATION[0]).await?;
    let emails = thread_emails(ctx, &thread_id).await?;
    ensure_len(&emails, CONVERSATION.len(), None)?;
    for key in CONVERSATION {
        ensure_includes(&emails, &ctx.email(key)?.to_string(), None)?;
    }
    Ok(())
});

body!(get_email_ids_order, |ctx| {
    let thread_id = thread_of(ctx, CONVERSATION[0]).await?;
    let emails = thread_emails(ctx, &thread_id).await?;
    let mut expected = Vec::new();
    for key in CONVERSATION {
        expected.push(ctx.email(key)?.to_string());
    }
    ensure_eq(&emails, &expected, Some("emailIds must be sorted by receivedAt"))?;
    Ok(())
});

body!(get_single_email_thread, |ctx| {
    let thread_id = thread_of(ctx, "plain-simple").await?;
    let emails = thread_emails(ctx, &thread_id).await?;
    ensure_eq(&emails, &vec![ctx.email("plain-simple")?.to_string()], None)?;
    Ok(())
});

body!(get_not_found, |ctx| {
    let resp = ctx
        .call("Thread/get", json!({ "ids": ["nonexistent-thread-xyz"] }))
        .await?;
    ensure_len(array(&resp["list"], "list")?, 0, None)?;
    ensure_includes(
        &strings(&resp["notFound"]),
        &"nonexistent-thread-xyz".to_string(),
        None,
    )?;
    Ok(())
});

// ── Thread/changes ──────────────────────────────────────────────────

async fn changes_since(ctx: &RunContext, state: &str) -> anyhow::Result<serde_json::Value> {
    Ok(ctx.call("Thread/changes", json!({ "sinceState": state })).await?)
}

body!(changes_no_changes, |ctx| {
    let state = get_state(ctx, "Thread").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_eq(&resp["oldState"], &json!(state), None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_len(array(&resp[list], list)?, 0, None)?;
    }
    Ok(())
});

body!(changes_after_new_email, |ctx| {
    let before = get_state(ctx, "Thread").await?;
    let inbox = ctx.role("inbox")?.to_string();
    let id = create_email(ctx, plain_email(&inbox, "New thread for changes test", "body")).await?;
    let resp = changes_since(ctx, &before).await;
    destroy_emails(ctx, &[&id]).await?;
    ensure_gt(
        strings(&resp?["created"]).len(),
        0,
        Some("Should have at least one new thread"),
    )?;
    Ok(())
});

body!(changes_after_email_destroy, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let id = create_email(ctx, plain_email(&inbox, "Thread to destroy", "body")).await?;
    let thread = ctx
        .call("Email/get", json!({ "ids": [id], "properties": ["threadId"] }))
        .await;
    let mid = get_state(ctx, "Thread").await;
    destroy_emails(ctx, &[&id]).await?;
    let thread = thread?;
    let thread_id = string(&first(&thread, "Email/get")?["threadId"], "threadId")?.to_string();
    let resp = changes_since(ctx, &mid?).await?;
    ensure_includes(&strings(&resp["destroyed"]), &thread_id, None)?;
    Ok(())
});

body!(changes_response_structure, |ctx| {
    let state = get_state(ctx, "Thread").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_changes_shape(&resp)?;
    Ok(())
});
