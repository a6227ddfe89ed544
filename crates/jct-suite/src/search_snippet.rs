// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::support::strings;
use jct_runtime::assertions::{
    array, ensure, ensure_contains, ensure_eq, ensure_gt, ensure_includes, ensure_type,
};
use jct_runtime::{AssertionFailure, Check, Group, RunContext, TestDescriptor};
use serde_json::{Value, json};

/// Checks in the `search-snippet` category.
pub fn checks() -> Vec<TestDescriptor> {
    let get = Group::new("search-snippet", "RFC8621", "5");
    vec![
        get.define("snippet-body-match", "A body match yields a highlighted preview", snippet_body_match),
        get.define("snippet-subject-match", "A subject match yields a highlighted subject", snippet_subject_match),
        get.define("snippet-null-when-no-match", "Non-matching emails get null subject and preview", snippet_null_when_no_match),
        get.define("snippet-response-structure", "SearchSnippet/get returns the standard shape", snippet_response_structure),
        get.define("snippet-not-found", "Unknown email ids are reported in notFound", snippet_not_found),
        get.define("snippet-mark-tags", "Matches are wrapped in <mark> tags", snippet_mark_tags)
            .recommended(),
    ]
}

async fn snippets(ctx: &RunContext, ids: &[String], text: &str) -> anyhow::Result<Value> {
    Ok(ctx
        .call(
            "SearchSnippet/get",
            json!({ "emailIds": ids, "filter": { "text": text } }),
        )
        .await?)
}

/// Snippet for `email_id` in a SearchSnippet/get response.
fn snippet_for<'a>(resp: &'a Value, email_id: &str) -> Check<&'a Value> {
    array(&resp["list"], "list")?
        .iter()
        .find(|s| s["emailId"] == email_id)
        .ok_or_else(|| AssertionFailure::new(format!("no snippet for {email_id}")))
}

/// Ids the server itself finds for `text`.
async fn matches(ctx: &RunContext, text: &str) -> anyhow::Result<Vec<String>> {
    let resp = ctx
        .call("Email/query", json!({ "filter": { "text": text } }))
        .await?;
    Ok(strings(&resp["ids"]))
}

body!(snippet_body_match, |ctx| {
    let ids = matches(ctx, "xylophone").await?;
    ensure_gt(ids.len(), 0, Some("the body term must match"))?;
    let resp = snippets(ctx, &ids, "xylophone").await?;
    let snippet = snippet_for(&resp, ctx.email("thread-reply-2")?)?;
    if let Some(preview) = snippet["preview"].as_str() {
        ensure(
            preview.to_lowercase().contains("xylophone") || preview.contains("<mark>"),
            "preview must show the match",
        )?;
    }
    Ok(())
});

body!(snippet_subject_match, |ctx| {
    let ids = matches(ctx, "Financial Report").await?;
    let target = ctx.email("html-attachment")?.to_string();
    ensure_includes(&ids, &target, None)?;
    let resp = snippets(ctx, &ids, "Financial Report").await?;
    let snippet = snippet_for(&resp, &target)?;
    if let Some(subject) = snippet["subject"].as_str() {
        ensure(
            subject.contains("Financial") || subject.contains("<mark>"),
            "subject must show the match",
        )?;
    }
    Ok(())
});

body!(snippet_null_when_no_match, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let resp = snippets(ctx, &[id.clone()], "xylophone").await?;
    let snippet = snippet_for(&resp, &id)?;
    ensure_eq(&snippet["subject"], &Value::Null, None)?;
    ensure_eq(&snippet["preview"], &Value::Null, None)?;
    Ok(())
});

body!(snippet_response_structure, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let resp = snippets(ctx, &[id], "meeting").await?;
    ensure_type(&resp["accountId"], "string", None)?;
    ensure_type(&resp["list"], "array", None)?;
    ensure(
        resp["notFound"].is_null() || resp["notFound"].is_array(),
        "notFound must be null or an array",
    )?;
    Ok(())
});

body!(snippet_not_found, |ctx| {
    let missing = "nonexistent-email-xyz".to_string();
    let resp = snippets(ctx, &[missing.clone()], "test").await?;
    ensure_includes(&strings(&resp["notFound"]), &missing, None)?;
    Ok(())
});

body!(snippet_mark_tags, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let resp = snippets(ctx, &[id.clone()], "conference").await?;
    let snippet = snippet_for(&resp, &id)?;
    let preview = snippet["preview"]
        .as_str()
        .ok_or_else(|| AssertionFailure::new("preview must be highlighted"))?;
    ensure_contains(preview, "<mark>", None)?;
    ensure_contains(preview, "</mark>", None)?;
    Ok(())
});
