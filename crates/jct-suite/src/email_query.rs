// SPDX-License-Identifier: MIT OR Apache-2.0
//! Email/query filters, sorting, thread collapsing and Email/queryChanges.
use crate::support::{added_ids, create_email, destroy_emails, plain_email, strings};
use chrono::{Duration, SecondsFormat, Utc};
use jct_runtime::assertions::{
    array, count, ensure, ensure_eq, ensure_ge, ensure_includes, ensure_len, ensure_lt,
    ensure_not_includes, ensure_type,
};
use jct_runtime::{Check, Group, RunContext, TestDescriptor};
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Filter, sort, collapse and queryChanges checks in the `email` category.
pub fn checks() -> Vec<TestDescriptor> {
    let filter = Group::new("email", "RFC8621", "4.4.1");
    let sort = Group::new("email", "RFC8621", "4.4.2");
    let collapse = Group::new("email", "RFC8621", "4.4.3");
    let query_changes = Group::new("email", "RFC8621", "4.5");
    vec![
        filter.define("filter-in-mailbox-other-than", "inMailboxOtherThan excludes the named mailboxes", filter_in_mailbox_other_than),
        filter.define("filter-before", "before matches emails received earlier", filter_before),
        filter.define("filter-after", "after matches emails received later", filter_after),
        filter.define("filter-before-and-after", "before and after together form a range", filter_before_and_after),
        filter.define("filter-min-size", "minSize matches large emails", filter_min_size),
        filter.define("filter-max-size", "maxSize excludes large emails", filter_max_size),
        filter.define("filter-has-keyword", "hasKeyword matches flagged emails", filter_has_keyword),
        filter.define("filter-not-keyword", "notKeyword excludes seen emails", filter_not_keyword),
        filter.define("filter-custom-keyword", "hasKeyword works with a custom keyword", filter_custom_keyword),
        filter.define("filter-has-attachment-true", "hasAttachment true matches emails with attachments", filter_has_attachment_true),
        filter.define("filter-has-attachment-false", "hasAttachment false excludes emails with attachments", filter_has_attachment_false),
        filter.define("filter-text-search-headers", "text searches the address and subject headers", filter_text_search_headers),
        filter.define("filter-text-search-body", "text searches body content", filter_text_search_body)
            .recommended(),
        filter.define("filter-from", "from matches the sender address", filter_from),
        filter.define("filter-from-display-name", "from matches the sender display name", filter_from_display_name),
        filter.define("filter-to", "to matches a recipient", filter_to),
        filter.define("filter-cc", "cc matches a Cc recipient", filter_cc),
        filter.define("filter-subject", "subject matches subject text", filter_subject),
        filter.define("filter-body", "body matches body text", filter_body),
        filter.define("filter-header-name-only", "header with a name checks existence", filter_header_name_only),
        filter.define("filter-header-name-value", "header with a name and value checks the value", filter_header_name_value),
        filter.define("filter-some-in-thread-have-keyword", "someInThreadHaveKeyword matches the whole thread", filter_some_in_thread),
        filter.define("filter-none-in-thread-have-keyword", "noneInThreadHaveKeyword excludes the whole thread", filter_none_in_thread),
        filter.define("filter-operator-and", "AND requires every condition", filter_operator_and),
        filter.define("filter-operator-or", "OR accepts any condition", filter_operator_or),
        filter.define("filter-operator-not", "NOT negates its condition", filter_operator_not),
        filter.define("filter-nested-operators", "Operators nest", filter_nested_operators),
        filter.define("filter-multiple-conditions-on-one-filter", "Properties of one condition are ANDed", filter_multiple_conditions),
        filter.define("filter-empty-matches-all", "An empty condition matches every email", filter_empty_matches_all),
        filter.define("filter-in-child-mailbox", "inMailbox works for a child mailbox", filter_in_child_mailbox),
        sort.define("sort-received-at-asc", "Sort by receivedAt ascending", sort_received_at_asc),
        sort.define("sort-size", "Sort by size ascending", sort_size),
        sort.define("sort-from", "Sort by sender", sort_from),
        sort.define("sort-subject", "Sort by subject", sort_subject)
            .recommended(),
        sort.define("sort-sent-at", "Sort by sentAt ascending", sort_sent_at),
        sort.define("sort-has-keyword", "Sort by hasKeyword puts flagged emails first", sort_has_keyword),
        sort.define("sort-multi-property", "Later comparators break ties", sort_multi_property),
        sort.define("sort-default-no-sort", "A query without sort still returns every match", sort_default),
        collapse.define("collapse-threads-basic", "collapseThreads reduces the result", collapse_threads_basic),
        collapse.define("collapse-threads-one-per-thread", "collapseThreads returns one email per thread", collapse_threads_one_per_thread),
        collapse.define("collapse-threads-with-filter", "collapseThreads applies after filtering", collapse_threads_with_filter),
        collapse.define(
            "collapse-threads-sort-determines-representative",
            "The first email in sort order represents its thread",
            collapse_threads_representative,
        ),
        collapse.define("collapse-threads-calculate-total", "total counts collapsed results", collapse_threads_total),
        query_changes.define("query-changes-no-changes", "queryChanges from the current state is empty", query_changes_no_changes),
        query_changes.define("query-changes-after-add", "A new matching email is reported as added", query_changes_after_add),
        query_changes.define("query-changes-after-remove", "A destroyed email is reported as removed", query_changes_after_remove),
        query_changes.define("query-changes-response-structure", "queryChanges returns the standard shape", query_changes_response_structure),
    ]
}

/// Ids matching `filter`, newest first.
async fn matching(ctx: &RunContext, filter: Value) -> anyhow::Result<Vec<String>> {
    let resp = ctx
        .call(
            "Email/query",
            json!({ "filter": filter, "sort": [{ "property": "receivedAt", "isAscending": false }] }),
        )
        .await?;
    Ok(strings(&resp["ids"]))
}

/// `folderB` ids ordered by `sort`.
async fn sorted(ctx: &RunContext, sort: Value) -> anyhow::Result<Vec<String>> {
    let folder = ctx.mailbox("folderB")?.to_string();
    let resp = ctx
        .call("Email/query", json!({ "filter": { "inMailbox": folder }, "sort": sort }))
        .await?;
    Ok(strings(&resp["ids"]))
}

fn fixture_ids(ctx: &RunContext, keys: &[&str]) -> Check<Vec<String>> {
    keys.iter().map(|k| ctx.email(k).map(str::to_string)).collect()
}

fn includes(ctx: &RunContext, ids: &[String], keys: &[&str]) -> Check {
    for id in fixture_ids(ctx, keys)? {
        ensure_includes(ids, &id, None)?;
    }
    Ok(())
}

fn excludes(ctx: &RunContext, ids: &[String], keys: &[&str]) -> Check {
    for id in fixture_ids(ctx, keys)? {
        ensure_not_includes(ids, &id, None)?;
    }
    Ok(())
}

fn days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Filters ─────────────────────────────────────────────────────────

body!(filter_in_mailbox_other_than, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let ids = matching(ctx, json!({ "inMailboxOtherThan": [inbox] })).await?;
    includes(ctx, &ids, &["very-old", "multi-mailbox"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_before, |ctx| {
    let ids = matching(ctx, json!({ "before": days_ago(5) })).await?;
    includes(ctx, &ids, &["very-old"])?;
    excludes(ctx, &ids, &["custom-keywords"])?;
    Ok(())
});

body!(filter_after, |ctx| {
    let ids = matching(ctx, json!({ "after": days_ago(5) })).await?;
    includes(ctx, &ids, &["custom-keywords"])?;
    excludes(ctx, &ids, &["very-old"])?;
    Ok(())
});

body!(filter_before_and_after, |ctx| {
    let ids = matching(ctx, json!({ "after": days_ago(8), "before": days_ago(2) })).await?;
    includes(ctx, &ids, &["thread-reply-1"])?;
    excludes(ctx, &ids, &["very-old", "custom-keywords"])?;
    Ok(())
});

body!(filter_min_size, |ctx| {
    let ids = matching(ctx, json!({ "minSize": 10000 })).await?;
    includes(ctx, &ids, &["large-email"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_max_size, |ctx| {
    let ids = matching(ctx, json!({ "maxSize": 1000 })).await?;
    excludes(ctx, &ids, &["large-email"])?;
    Ok(())
});

body!(filter_has_keyword, |ctx| {
    let ids = matching(ctx, json!({ "hasKeyword": "$flagged" })).await?;
    includes(ctx, &ids, &["html-attachment", "sort-test-2"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_not_keyword, |ctx| {
    let ids = matching(ctx, json!({ "notKeyword": "$seen" })).await?;
    includes(ctx, &ids, &["thread-reply-1"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_custom_keyword, |ctx| {
    let ids = matching(ctx, json!({ "hasKeyword": "custom_label" })).await?;
    ensure_len(&ids, 1, None)?;
    includes(ctx, &ids, &["custom-keywords"])?;
    Ok(())
});

body!(filter_has_attachment_true, |ctx| {
    let ids = matching(ctx, json!({ "hasAttachment": true })).await?;
    includes(ctx, &ids, &["html-attachment"])?;
    Ok(())
});

body!(filter_has_attachment_false, |ctx| {
    let ids = matching(ctx, json!({ "hasAttachment": false })).await?;
    includes(ctx, &ids, &["plain-simple"])?;
    excludes(ctx, &ids, &["html-attachment"])?;
    Ok(())
});

body!(filter_text_search_headers, |ctx| {
    let ids = matching(ctx, json!({ "text": "Project Alpha" })).await?;
    includes(ctx, &ids, &["thread-reply-2"])?;
    Ok(())
});

body!(filter_text_search_body, |ctx| {
    let ids = matching(ctx, json!({ "text": "xylophone" })).await?;
    includes(ctx, &ids, &["thread-reply-2"])?;
    Ok(())
});

body!(filter_from, |ctx| {
    let ids = matching(ctx, json!({ "from": "alice@example.com" })).await?;
    includes(ctx, &ids, &["plain-simple", "thread-reply-1"])?;
    excludes(ctx, &ids, &["html-attachment"])?;
    Ok(())
});

body!(filter_from_display_name, |ctx| {
    let ids = matching(ctx, json!({ "from": "Alice Sender" })).await?;
    includes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_to, |ctx| {
    let ids = matching(ctx, json!({ "to": "alice@example.com" })).await?;
    includes(ctx, &ids, &["thread-starter"])?;
    Ok(())
});

body!(filter_cc, |ctx| {
    let ids = matching(ctx, json!({ "cc": "charlie@example.net" })).await?;
    includes(ctx, &ids, &["html-attachment"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_subject, |ctx| {
    let ids = matching(ctx, json!({ "subject": "Financial Report" })).await?;
    includes(ctx, &ids, &["html-attachment"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_body, |ctx| {
    let ids = matching(ctx, json!({ "body": "conference room" })).await?;
    includes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_header_name_only, |ctx| {
    let ids = matching(ctx, json!({ "header": ["X-Custom-Header"] })).await?;
    includes(ctx, &ids, &["special-headers"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_header_name_value, |ctx| {
    let ids = matching(ctx, json!({ "header": ["X-Custom-Header", "custom-value-12345"] })).await?;
    includes(ctx, &ids, &["special-headers"])?;
    Ok(())
});

body!(filter_some_in_thread, |ctx| {
    let ids = matching(ctx, json!({ "someInThreadHaveKeyword": "$answered" })).await?;
    includes(ctx, &ids, &["thread-starter", "thread-reply-1", "thread-reply-2"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_none_in_thread, |ctx| {
    let ids = matching(ctx, json!({ "noneInThreadHaveKeyword": "$answered" })).await?;
    excludes(ctx, &ids, &["thread-starter", "thread-reply-1", "thread-reply-2"])?;
    includes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_operator_and, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let ids = matching(
        ctx,
        json!({ "operator": "AND", "conditions": [{ "hasKeyword": "$seen" }, { "inMailbox": inbox }] }),
    )
    .await?;
    includes(ctx, &ids, &["plain-simple"])?;
    excludes(ctx, &ids, &["thread-reply-1", "very-old"])?;
    Ok(())
});

body!(filter_operator_or, |ctx| {
    let ids = matching(
        ctx,
        json!({ "operator": "OR", "conditions": [{ "hasKeyword": "$flagged" }, { "hasKeyword": "$answered" }] }),
    )
    .await?;
    includes(ctx, &ids, &["html-attachment", "thread-reply-2"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_operator_not, |ctx| {
    let ids = matching(ctx, json!({ "operator": "NOT", "conditions": [{ "hasKeyword": "$seen" }] })).await?;
    includes(ctx, &ids, &["thread-reply-1"])?;
    excludes(ctx, &ids, &["plain-simple"])?;
    Ok(())
});

body!(filter_nested_operators, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let ids = matching(
        ctx,
        json!({
            "operator": "OR",
            "conditions": [
                { "operator": "AND", "conditions": [{ "inMailbox": inbox }, { "hasKeyword": "$seen" }] },
                { "hasKeyword": "$flagged" },
            ],
        }),
    )
    .await?;
    includes(ctx, &ids, &["plain-simple", "html-attachment", "sort-test-2"])?;
    excludes(ctx, &ids, &["thread-reply-1"])?;
    Ok(())
});

body!(filter_multiple_conditions, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let ids = matching(ctx, json!({ "inMailbox": inbox, "hasKeyword": "$flagged" })).await?;
    includes(ctx, &ids, &["html-attachment"])?;
    excludes(ctx, &ids, &["plain-simple", "sort-test-2"])?;
    Ok(())
});

body!(filter_empty_matches_all, |ctx| {
    let resp = ctx
        .call("Email/query", json!({ "filter": {}, "calculateTotal": true }))
        .await?;
    let total = count(&resp["total"], "total")?;
    ensure_ge(
        total,
        ctx.email_ids.len() as u64,
        Some("an empty filter must match every fixture email"),
    )?;
    Ok(())
});

body!(filter_in_child_mailbox, |ctx| {
    let child = ctx.mailbox("child1")?.to_string();
    let ids = matching(ctx, json!({ "inMailbox": child })).await?;
    includes(ctx, &ids, &["child-mailbox-email"])?;
    excludes(ctx, &ids, &["thread-starter"])?;
    Ok(())
});

// ── Sorting ─────────────────────────────────────────────────────────

body!(sort_received_at_asc, |ctx| {
    let ids = sorted(ctx, json!([{ "property": "receivedAt", "isAscending": true }])).await?;
    let expected = fixture_ids(ctx, &["large-email", "sort-test-1", "sort-test-2", "sort-test-3"])?;
    ensure_eq(&ids, &expected, Some("oldest first"))?;
    Ok(())
});

body!(sort_size, |ctx| {
    let ids = sorted(ctx, json!([{ "property": "size", "isAscending": true }])).await?;
    let expected = fixture_ids(ctx, &["sort-test-3", "sort-test-1", "sort-test-2", "large-email"])?;
    ensure_eq(&ids, &expected, Some("smallest first"))?;
    Ok(())
});

body!(sort_from, |ctx| {
    let ids = sorted(ctx, json!([{ "property": "from", "isAscending": true }])).await?;
    let expected = fixture_ids(ctx, &["sort-test-2", "large-email", "sort-test-3", "sort-test-1"])?;
    ensure_eq(&ids, &expected, Some("Amy, Eve, Mike, Zara"))?;
    Ok(())
});

body!(sort_subject, |ctx| {
    let ids = sorted(ctx, json!([{ "property": "subject", "isAscending": true }])).await?;
    let expected = fixture_ids(ctx, &["sort-test-1", "sort-test-2", "large-email", "sort-test-3"])?;
    ensure_eq(&ids, &expected, Some("Alpha, Beta, Detailed, Gamma"))?;
    Ok(())
});

body!(sort_sent_at, |ctx| {
    let ids = sorted(ctx, json!([{ "property": "sentAt", "isAscending": true }])).await?;
    let expected = fixture_ids(ctx, &["sort-test-1", "large-email", "sort-test-2", "sort-test-3"])?;
    ensure_eq(&ids, &expected, Some("Date header order differs from receivedAt"))?;
    Ok(())
});

body!(sort_has_keyword, |ctx| {
    let ids = sorted(
        ctx,
        json!([{ "property": "hasKeyword", "keyword": "$flagged", "isAscending": false }]),
    )
    .await?;
    ensure_len(&ids, 4, None)?;
    ensure_eq(&ids[0], &ctx.email("sort-test-2")?.to_string(), Some("the flagged email sorts first"))?;
    Ok(())
});

body!(sort_multi_property, |ctx| {
    let ids = sorted(
        ctx,
        json!([
            { "property": "hasKeyword", "keyword": "$seen", "isAscending": false },
            { "property": "size", "isAscending": true },
        ]),
    )
    .await?;
    let expected = fixture_ids(ctx, &["sort-test-1", "sort-test-2", "sort-test-3", "large-email"])?;
    ensure_eq(&ids, &expected, Some("seen first, then by size"))?;
    Ok(())
});

body!(sort_default, |ctx| {
    let folder = ctx.mailbox("folderB")?.to_string();
    let resp = ctx
        .call("Email/query", json!({ "filter": { "inMailbox": folder } }))
        .await?;
    let ids = strings(&resp["ids"]);
    ensure_len(&ids, 4, None)?;
    includes(ctx, &ids, &["large-email", "sort-test-1", "sort-test-2", "sort-test-3"])?;
    Ok(())
});

// ── Thread collapsing ───────────────────────────────────────────────

async fn query_collapsed(ctx: &RunContext, collapse: bool, filter: Value) -> anyhow::Result<Value> {
    Ok(ctx
        .call(
            "Email/query",
            json!({
                "filter": filter,
                "sort": [{ "property": "receivedAt", "isAscending": false }],
                "collapseThreads": collapse,
                "calculateTotal": true,
            }),
        )
        .await?)
}

body!(collapse_threads_basic, |ctx| {
    let expanded = strings(&query_collapsed(ctx, false, Value::Null).await?["ids"]);
    let collapsed = strings(&query_collapsed(ctx, true, Value::Null).await?["ids"]);
    ensure_lt(
        collapsed.len(),
        expanded.len(),
        Some("the three-message thread must collapse"),
    )?;
    Ok(())
});

body!(collapse_threads_one_per_thread, |ctx| {
    let ids = strings(&query_collapsed(ctx, true, Value::Null).await?["ids"]);
    let resp = ctx
        .call("Email/get", json!({ "ids": ids, "properties": ["threadId"] }))
        .await?;
    let list = array(&resp["list"], "list")?;
    let threads: BTreeSet<&str> = list.iter().filter_map(|e| e["threadId"].as_str()).collect();
    ensure_eq(&threads.len(), &list.len(), Some("each thread appears once"))?;
    Ok(())
});

body!(collapse_threads_with_filter, |ctx| {
    let filter = json!({ "subject": "Project Alpha" });
    let expanded = strings(&query_collapsed(ctx, false, filter.clone()).await?["ids"]);
    let collapsed = strings(&query_collapsed(ctx, true, filter).await?["ids"]);
    ensure_eq(&expanded.len(), &3, None)?;
    ensure_len(&collapsed, 1, Some("the filtered thread collapses to one email"))?;
    Ok(())
});

body!(collapse_threads_representative, |ctx| {
    let ids = strings(&query_collapsed(ctx, true, Value::Null).await?["ids"]);
    includes(ctx, &ids, &["thread-reply-2"])?;
    excludes(ctx, &ids, &["thread-reply-1", "thread-starter"])?;
    Ok(())
});

body!(collapse_threads_total, |ctx| {
    let resp = query_collapsed(ctx, true, Value::Null).await?;
    let total = count(&resp["total"], "total")?;
    ensure_eq(&total, &(strings(&resp["ids"]).len() as u64), None)?;
    Ok(())
});

// ── Email/queryChanges ──────────────────────────────────────────────

/// `Email/query` over `folderB`, newest first, returning ids and queryState.
async fn folder_query(ctx: &RunContext) -> anyhow::Result<(Vec<String>, String)> {
    let resp = ctx.call("Email/query", folder_args(ctx)?).await?;
    let state = resp["queryState"].as_str().unwrap_or_default().to_string();
    Ok((strings(&resp["ids"]), state))
}

fn folder_args(ctx: &RunContext) -> Check<Value> {
    Ok(json!({
        "filter": { "inMailbox": ctx.mailbox("folderB")? },
        "sort": [{ "property": "receivedAt", "isAscending": false }],
    }))
}

async fn folder_changes(ctx: &RunContext, since: &str) -> anyhow::Result<Value> {
    let mut args = folder_args(ctx)?;
    args["sinceQueryState"] = json!(since);
    Ok(ctx.call("Email/queryChanges", args).await?)
}

async fn new_folder_email(ctx: &RunContext, subject: &str) -> anyhow::Result<String> {
    let folder = ctx.mailbox("folderB")?.to_string();
    create_email(ctx, plain_email(&folder, subject, "Query change fixture.")).await
}

body!(query_changes_no_changes, |ctx| {
    let (_, state) = folder_query(ctx).await?;
    let resp = folder_changes(ctx, &state).await?;
    ensure_eq(&resp["oldQueryState"], &json!(state), None)?;
    ensure_len(array(&resp["removed"], "removed")?, 0, None)?;
    ensure_len(array(&resp["added"], "added")?, 0, None)?;
    Ok(())
});

body!(query_changes_after_add, |ctx| {
    let (_, state) = folder_query(ctx).await?;
    let id = new_folder_email(ctx, "Query changes add").await?;
    let resp = folder_changes(ctx, &state).await;
    destroy_emails(ctx, &[&id]).await?;
    let resp = resp?;
    ensure_includes(&added_ids(&resp), &id, None)?;
    ensure_eq(&resp["added"][0]["index"], &json!(0), Some("the new email is the newest"))?;
    Ok(())
});

body!(query_changes_after_remove, |ctx| {
    let id = new_folder_email(ctx, "Query changes remove").await?;
    let (before, state) = folder_query(ctx).await?;
    destroy_emails(ctx, &[&id]).await?;
    ensure_includes(&before, &id, None)?;
    let resp = folder_changes(ctx, &state).await?;
    ensure_includes(&strings(&resp["removed"]), &id, None)?;
    ensure_not_includes(&added_ids(&resp), &id, None)?;
    Ok(())
});

body!(query_changes_response_structure, |ctx| {
    let (_, state) = folder_query(ctx).await?;
    let resp = folder_changes(ctx, &state).await?;
    for key in ["accountId", "oldQueryState", "newQueryState"] {
        ensure_type(&resp[key], "string", None)?;
    }
    ensure_type(&resp["removed"], "array", None)?;
    ensure_type(&resp["added"], "array", None)?;
    ensure(
        resp.get("total").is_none_or(|t| t.is_u64()),
        "total, when present, is a number",
    )?;
    Ok(())
});
