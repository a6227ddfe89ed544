// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::support::{created_id, expect_method_error, first, set_error_type, strings};
use jct_runtime::assertions::{
    array, count, ensure, ensure_eq, ensure_gt, ensure_has_property, ensure_includes, ensure_len,
    ensure_not_includes, ensure_type, string,
};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Value, json};

const MISSING: &str = "nonexistent-mailbox-xyz";

const RIGHTS: &[&str] = &[
    "mayReadItems",
    "mayAddItems",
    "mayRemoveItems",
    "maySetSeen",
    "maySetKeywords",
    "mayCreateChild",
    "mayRename",
    "mayDelete",
    "maySubmit",
];

/// Checks in the `mailbox` category.
pub fn checks() -> Vec<TestDescriptor> {
    let get = Group::new("mailbox", "RFC8621", "2.1");
    let changes = Group::new("mailbox", "RFC8621", "2.2");
    let query = Group::new("mailbox", "RFC8621", "2.3");
    let query_changes = Group::new("mailbox", "RFC8621", "2.4");
    let set = Group::new("mailbox", "RFC8621", "2.5");
    vec![
        get.define("get-all", "Mailbox/get with null ids returns every mailbox", get_all),
        get.define("get-by-ids", "Mailbox/get returns the requested mailbox", get_by_ids),
        get.define("get-not-found", "Unknown ids are reported in notFound", get_not_found),
        get.define("get-properties-filter", "properties limits the returned fields", get_properties_filter),
        get.define("get-inbox-exists", "Account has a mailbox with role inbox", get_inbox_exists)
            .section("2"),
        get.define("get-mailbox-properties", "Mailbox objects carry every standard property", get_mailbox_properties)
            .section("2"),
        get.define("get-parent-id-correct", "parentId reflects the hierarchy", get_parent_id_correct)
            .section("2"),
        get.define("get-total-emails-accurate", "totalEmails matches an Email/query total", get_total_emails_accurate)
            .section("2"),
        changes.define("changes-no-changes", "Mailbox/changes from the current state is empty", changes_no_changes),
        changes.define("changes-after-create", "A created mailbox is reported in created", changes_after_create),
        changes.define("changes-after-rename", "A renamed mailbox is reported in updated", changes_after_rename),
        changes.define("changes-response-structure", "Mailbox/changes has the standard /changes shape", changes_response_structure)
            .rfc("RFC8620")
            .section("5.2"),
        changes.define("changes-max-changes", "maxChanges splits a backlog and sets hasMoreChanges", changes_max_changes)
            .rfc("RFC8620")
            .section("5.2"),
        changes.define("changes-invalid-state", "An unknown sinceState returns cannotCalculateChanges", changes_invalid_state)
            .rfc("RFC8620")
            .section("5.2"),
        query.define("query-all", "Mailbox/query without a filter returns every mailbox", query_all),
        query.define("query-filter-by-parent-id-null", "parentId null selects top-level mailboxes", query_filter_by_parent_id_null)
            .section("2.3"),
        query.define("query-filter-by-parent-id", "parentId selects the children of a mailbox", query_filter_by_parent_id),
        query.define("query-filter-by-name", "name filter matches the mailbox name", query_filter_by_name),
        query.define("query-filter-by-role", "role filter returns the role mailbox", query_filter_by_role),
        query.define("query-filter-has-any-role", "hasAnyRole true returns only role mailboxes", query_filter_has_any_role),
        query.define("query-filter-has-any-role-false", "hasAnyRole false returns custom mailboxes", query_filter_has_any_role_false),
        query.define("query-sort-by-name", "Sorting by name returns alphabetical order", query_sort_by_name),
        query.define("query-response-structure", "Mailbox/query has the standard /query shape", query_response_structure)
            .rfc("RFC8620")
            .section("5.5"),
        query.define("query-position", "position skips into the sorted result", query_position)
            .rfc("RFC8620")
            .section("5.5"),
        query.define("query-filter-null-accepted", "A null filter is accepted", query_filter_null_accepted)
            .rfc("RFC8620")
            .section("5.5"),
        query_changes.define("query-changes-no-changes", "queryChanges from the current query state is empty", query_changes_no_changes),
        query_changes.define("query-changes-after-create", "A created mailbox is reported in added", query_changes_after_create),
        query_changes.define("query-changes-after-destroy", "A destroyed mailbox is reported in removed", query_changes_after_destroy),
        set.define("set-create-top-level", "Mailbox/set creates a top-level mailbox", set_create_top_level),
        set.define("set-create-child", "Mailbox/set creates a child mailbox", set_create_child),
        set.define("set-create-missing-name", "Creating a mailbox without a name fails", set_create_missing_name)
            .recommended(),
        set.define("set-update-rename", "Mailbox/set renames a mailbox", set_update_rename),
        set.define("set-destroy-empty", "Mailbox/set destroys an empty mailbox", set_destroy_empty),
        set.define("set-destroy-not-found", "Destroying an unknown mailbox reports notFound", set_destroy_not_found),
        set.define("set-cannot-destroy-with-children", "A mailbox with children is not destroyed", set_cannot_destroy_with_children),
    ]
}

async fn get_one(ctx: &RunContext, id: &str) -> anyhow::Result<Value> {
    let resp = ctx.call("Mailbox/get", json!({ "ids": [id] })).await?;
    Ok(first(&resp, "Mailbox/get")?.clone())
}

async fn create(ctx: &RunContext, props: Value) -> anyhow::Result<String> {
    let resp = ctx
        .call("Mailbox/set", json!({ "create": { "new": props } }))
        .await?;
    Ok(created_id(&resp, "new")?)
}

async fn destroy(ctx: &RunContext, id: &str) -> anyhow::Result<Value> {
    Ok(ctx.call("Mailbox/set", json!({ "destroy": [id] })).await?)
}

async fn current_state(ctx: &RunContext) -> anyhow::Result<String> {
    let resp = ctx.call("Mailbox/get", json!({ "ids": [] })).await?;
    Ok(string(&resp["state"], "state")?.to_string())
}

async fn changes_since(ctx: &RunContext, state: &str) -> anyhow::Result<Value> {
    Ok(ctx.call("Mailbox/changes", json!({ "sinceState": state })).await?)
}

async fn query_ids(ctx: &RunContext, filter: Value) -> anyhow::Result<Vec<String>> {
    let resp = ctx.call("Mailbox/query", json!({ "filter": filter })).await?;
    Ok(strings(&resp["ids"]))
}

fn by_name() -> Value {
    json!([{ "property": "name", "isAscending": true }])
}

// ── Mailbox/get ─────────────────────────────────────────────────────

body!(get_all, |ctx| {
    let resp = ctx.call("Mailbox/get", json!({ "ids": null })).await?;
    let list = array(&resp["list"], "list")?;
    ensure(!list.is_empty(), "Expected at least one mailbox")?;
    for mailbox in list {
        ensure_type(&mailbox["id"], "string", None)?;
        ensure_type(&mailbox["name"], "string", None)?;
    }
    let ids: Vec<String> = list.iter().filter_map(|m| m["id"].as_str()).map(str::to_string).collect();
    for name in ["folderA", "folderB", "child1", "child2"] {
        ensure_includes(&ids, &ctx.mailbox(name)?.to_string(), None)?;
    }
    ensure_type(&resp["state"], "string", None)?;
    Ok(())
});

body!(get_by_ids, |ctx| {
    let id = ctx.mailbox("folderA")?.to_string();
    let resp = ctx.call("Mailbox/get", json!({ "ids": [id] })).await?;
    let list = array(&resp["list"], "list")?;
    ensure_len(list, 1, None)?;
    ensure_eq(&list[0]["id"], &json!(id), None)?;
    ensure_eq(&list[0]["name"], &json!("Test Folder A"), None)?;
    Ok(())
});

body!(get_not_found, |ctx| {
    let resp = ctx.call("Mailbox/get", json!({ "ids": [MISSING] })).await?;
    ensure_len(array(&resp["list"], "list")?, 0, None)?;
    ensure_includes(&strings(&resp["notFound"]), &MISSING.to_string(), None)?;
    Ok(())
});

body!(get_properties_filter, |ctx| {
    let id = ctx.mailbox("folderA")?.to_string();
    let resp = ctx
        .call("Mailbox/get", json!({ "ids": [id], "properties": ["name"] }))
        .await?;
    let mailbox = first(&resp, "Mailbox/get")?;
    ensure_has_property(mailbox, "id", Some("id is always returned"))?;
    ensure_has_property(mailbox, "name", None)?;
    ensure(
        mailbox.get("totalEmails").is_none(),
        "totalEmails was not requested",
    )?;
    Ok(())
});

body!(get_inbox_exists, |ctx| {
    let resp = ctx.call("Mailbox/get", json!({ "ids": null })).await?;
    let list = array(&resp["list"], "list")?;
    ensure(
        list.iter().any(|m| m["role"] == "inbox"),
        "No mailbox with role inbox",
    )?;
    Ok(())
});

body!(get_mailbox_properties, |ctx| {
    let id = ctx.mailbox("folderA")?.to_string();
    let mailbox = get_one(ctx, &id).await?;
    ensure_type(&mailbox["id"], "string", None)?;
    ensure_type(&mailbox["name"], "string", None)?;
    ensure_has_property(&mailbox, "parentId", None)?;
    ensure_has_property(&mailbox, "role", None)?;
    for key in ["sortOrder", "totalEmails", "unreadEmails", "totalThreads", "unreadThreads"] {
        let message = format!("{key} must be a number");
        ensure_type(&mailbox[key], "number", Some(message.as_str()))?;
    }
    ensure_type(&mailbox["isSubscribed"], "boolean", None)?;
    let rights = &mailbox["myRights"];
    ensure_type(rights, "object", None)?;
    for right in RIGHTS {
        let message = format!("myRights.{right} must be a boolean");
        ensure_type(&rights[*right], "boolean", Some(message.as_str()))?;
    }
    Ok(())
});

body!(get_parent_id_correct, |ctx| {
    let parent = ctx.mailbox("folderA")?.to_string();
    let child = ctx.mailbox("child1")?.to_string();
    let top = get_one(ctx, &parent).await?;
    ensure_eq(&top["parentId"], &Value::Null, Some("folderA is top-level"))?;
    let nested = get_one(ctx, &child).await?;
    ensure_eq(&nested["parentId"], &json!(parent), None)?;
    Ok(())
});

body!(get_total_emails_accurate, |ctx| {
    let id = ctx.mailbox("folderB")?.to_string();
    let mailbox = get_one(ctx, &id).await?;
    let query = ctx
        .call(
            "Email/query",
            json!({ "filter": { "inMailbox": id }, "calculateTotal": true }),
        )
        .await?;
    let total = count(&query["total"], "total")?;
    ensure_eq(&count(&mailbox["totalEmails"], "totalEmails")?, &total, None)?;
    ensure_eq(&total, &4, Some("folderB holds four fixture emails"))?;
    Ok(())
});

// ── Mailbox/changes ─────────────────────────────────────────────────

body!(changes_no_changes, |ctx| {
    let state = current_state(ctx).await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_eq(&resp["oldState"], &json!(state), None)?;
    ensure_type(&resp["newState"], "string", None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_len(array(&resp[list], list)?, 0, None)?;
    }
    ensure_eq(&resp["hasMoreChanges"], &json!(false), None)?;
    Ok(())
});

body!(changes_after_create, |ctx| {
    let before = current_state(ctx).await?;
    let id = create(ctx, json!({ "name": "Temp Changes Test", "parentId": null })).await?;
    let resp = changes_since(ctx, &before).await;
    destroy(ctx, &id).await?;
    ensure_includes(&strings(&resp?["created"]), &id, None)?;
    Ok(())
});

body!(changes_after_rename, |ctx| {
    let id = create(ctx, json!({ "name": "Before Rename", "parentId": null })).await?;
    let mid = current_state(ctx).await?;
    let renamed = ctx
        .call("Mailbox/set", json!({ "update": { id.as_str(): { "name": "After Rename" } } }))
        .await;
    let resp = changes_since(ctx, &mid).await;
    destroy(ctx, &id).await?;
    renamed?;
    let resp = resp?;
    ensure_includes(&strings(&resp["updated"]), &id, None)?;
    ensure_not_includes(&strings(&resp["created"]), &id, None)?;
    Ok(())
});

body!(changes_response_structure, |ctx| {
    let state = current_state(ctx).await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_type(&resp["accountId"], "string", None)?;
    ensure_type(&resp["oldState"], "string", None)?;
    ensure_type(&resp["newState"], "string", None)?;
    ensure_type(&resp["hasMoreChanges"], "boolean", None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_type(&resp[list], "array", None)?;
    }
    Ok(())
});

/// One `maxChanges: 1` page from `since`, then the rest if more remain.
async fn two_pages(ctx: &RunContext, since: &str) -> anyhow::Result<(Value, Option<Value>)> {
    let first = ctx
        .call("Mailbox/changes", json!({ "sinceState": since, "maxChanges": 1 }))
        .await?;
    let rest = match first["newState"].as_str() {
        Some(next) if first["hasMoreChanges"] == true => Some(changes_since(ctx, next).await?),
        _ => None,
    };
    Ok((first, rest))
}

fn listed(page: &Value) -> usize {
    ["created", "updated", "destroyed"]
        .iter()
        .map(|list| strings(&page[*list]).len())
        .sum()
}

body!(changes_max_changes, |ctx| {
    let before = current_state(ctx).await?;
    let a = create(ctx, json!({ "name": "Backlog A" })).await?;
    let b = create(ctx, json!({ "name": "Backlog B" })).await;
    let pages = two_pages(ctx, &before).await;
    destroy(ctx, &a).await?;
    if let Ok(b) = &b {
        destroy(ctx, b).await?;
    }
    b?;
    let (first_page, rest) = pages?;
    ensure_eq(&listed(&first_page), &1, Some("maxChanges 1 must list exactly one id"))?;
    ensure_eq(&first_page["hasMoreChanges"], &json!(true), Some("a second change remains"))?;
    let rest = rest.ok_or_else(|| anyhow::anyhow!("no second page"))?;
    ensure_eq(&listed(&rest), &1, Some("the second page lists the other mailbox"))?;
    ensure_eq(&rest["hasMoreChanges"], &json!(false), None)?;
    Ok(())
});

body!(changes_invalid_state, |ctx| {
    let result = ctx
        .client
        .call(
            "Mailbox/changes",
            json!({ "accountId": ctx.account_id, "sinceState": "nonexistent-state-xyz" }),
        )
        .await;
    expect_method_error(result, "cannotCalculateChanges")
});

// ── Mailbox/query ───────────────────────────────────────────────────

body!(query_all, |ctx| {
    let resp = ctx
        .call("Mailbox/query", json!({ "filter": {}, "calculateTotal": true }))
        .await?;
    let ids = strings(&resp["ids"]);
    ensure_gt(ids.len(), 0, None)?;
    ensure_eq(&(ids.len() as u64), &count(&resp["total"], "total")?, None)?;
    Ok(())
});

body!(query_filter_by_parent_id_null, |ctx| {
    let ids = query_ids(ctx, json!({ "parentId": null })).await?;
    ensure_includes(&ids, &ctx.role("inbox")?.to_string(), None)?;
    for name in ["folderA", "folderB"] {
        ensure_includes(&ids, &ctx.mailbox(name)?.to_string(), None)?;
    }
    for name in ["child1", "child2"] {
        ensure_not_includes(&ids, &ctx.mailbox(name)?.to_string(), None)?;
    }
    Ok(())
});

body!(query_filter_by_parent_id, |ctx| {
    let parent = ctx.mailbox("folderA")?.to_string();
    let ids = query_ids(ctx, json!({ "parentId": parent })).await?;
    ensure_len(&ids, 2, None)?;
    for name in ["child1", "child2"] {
        ensure_includes(&ids, &ctx.mailbox(name)?.to_string(), None)?;
    }
    Ok(())
});

body!(query_filter_by_name, |ctx| {
    let ids = query_ids(ctx, json!({ "name": "Test Folder A" })).await?;
    ensure_includes(&ids, &ctx.mailbox("folderA")?.to_string(), None)?;
    Ok(())
});

body!(query_filter_by_role, |ctx| {
    let ids = query_ids(ctx, json!({ "role": "inbox" })).await?;
    ensure_eq(&ids, &vec![ctx.role("inbox")?.to_string()], None)?;
    Ok(())
});

body!(query_filter_has_any_role, |ctx| {
    let ids = query_ids(ctx, json!({ "hasAnyRole": true })).await?;
    let resp = ctx
        .call("Mailbox/get", json!({ "ids": &ids, "properties": ["role"] }))
        .await?;
    for mailbox in array(&resp["list"], "list")? {
        let message = format!("mailbox {} should have a role", mailbox["id"]);
        ensure(mailbox["role"].is_string(), message)?;
    }
    ensure_not_includes(&ids, &ctx.mailbox("folderA")?.to_string(), None)?;
    Ok(())
});

body!(query_filter_has_any_role_false, |ctx| {
    let ids = query_ids(ctx, json!({ "hasAnyRole": false })).await?;
    for name in ["folderA", "folderB"] {
        ensure_includes(&ids, &ctx.mailbox(name)?.to_string(), None)?;
    }
    ensure_not_includes(&ids, &ctx.role("inbox")?.to_string(), None)?;
    Ok(())
});

body!(query_sort_by_name, |ctx| {
    let resp = ctx
        .call("Mailbox/query", json!({ "filter": {}, "sort": by_name() }))
        .await?;
    let ids = strings(&resp["ids"]);
    let got = ctx
        .call("Mailbox/get", json!({ "ids": &ids, "properties": ["name"] }))
        .await?;
    let list = array(&got["list"], "list")?;
    let names: Vec<String> = ids
        .iter()
        .filter_map(|id| list.iter().find(|m| m["id"] == id.as_str()))
        .map(|m| m["name"].as_str().unwrap_or_default().to_lowercase())
        .collect();
    for pair in names.windows(2) {
        ensure(
            pair[0] <= pair[1],
            format!("expected '{}' <= '{}' in sort order", pair[0], pair[1]),
        )?;
    }
    Ok(())
});

body!(query_response_structure, |ctx| {
    let resp = ctx.call("Mailbox/query", json!({ "filter": {} })).await?;
    ensure_type(&resp["accountId"], "string", None)?;
    ensure_type(&resp["queryState"], "string", None)?;
    ensure_type(&resp["canCalculateChanges"], "boolean", None)?;
    ensure_type(&resp["position"], "number", None)?;
    ensure_type(&resp["ids"], "array", None)?;
    Ok(())
});

body!(query_position, |ctx| {
    let all = ctx
        .call("Mailbox/query", json!({ "filter": {}, "sort": by_name() }))
        .await?;
    let all = strings(&all["ids"]);
    ensure(all.len() >= 2, "need at least two mailboxes")?;
    let resp = ctx
        .call("Mailbox/query", json!({ "filter": {}, "sort": by_name(), "position": 1 }))
        .await?;
    ensure_eq(&resp["position"], &json!(1), None)?;
    ensure_eq(&strings(&resp["ids"]).first(), &all.get(1), None)?;
    Ok(())
});

body!(query_filter_null_accepted, |ctx| {
    let ids = query_ids(ctx, Value::Null).await?;
    ensure(!ids.is_empty(), "a null filter should return mailboxes")?;
    Ok(())
});

// ── Mailbox/queryChanges ────────────────────────────────────────────

async fn query_state(ctx: &RunContext) -> anyhow::Result<String> {
    let resp = ctx
        .call("Mailbox/query", json!({ "filter": {}, "sort": by_name() }))
        .await?;
    Ok(string(&resp["queryState"], "queryState")?.to_string())
}

async fn query_changes_since(ctx: &RunContext, state: &str) -> anyhow::Result<Value> {
    Ok(ctx
        .call(
            "Mailbox/queryChanges",
            json!({ "filter": {}, "sort": by_name(), "sinceQueryState": state }),
        )
        .await?)
}

fn added_ids(resp: &Value) -> Vec<String> {
    resp["added"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|a| a["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

body!(query_changes_no_changes, |ctx| {
    let state = query_state(ctx).await?;
    let resp = query_changes_since(ctx, &state).await?;
    ensure_eq(&resp["oldQueryState"], &json!(state), None)?;
    ensure_type(&resp["newQueryState"], "string", None)?;
    ensure_len(array(&resp["removed"], "removed")?, 0, None)?;
    ensure_len(array(&resp["added"], "added")?, 0, None)?;
    Ok(())
});

body!(query_changes_after_create, |ctx| {
    let state = query_state(ctx).await?;
    let id = create(ctx, json!({ "name": "QC Test Mailbox", "parentId": null })).await?;
    let resp = query_changes_since(ctx, &state).await;
    destroy(ctx, &id).await?;
    ensure_includes(&added_ids(&resp?), &id, None)?;
    Ok(())
});

body!(query_changes_after_destroy, |ctx| {
    let id = create(ctx, json!({ "name": "QC Removed Mailbox", "parentId": null })).await?;
    let state = query_state(ctx).await;
    destroy(ctx, &id).await?;
    let resp = query_changes_since(ctx, &state?).await?;
    ensure_includes(&strings(&resp["removed"]), &id, None)?;
    ensure_not_includes(&added_ids(&resp), &id, None)?;
    Ok(())
});

// ── Mailbox/set ─────────────────────────────────────────────────────

body!(set_create_top_level, |ctx| {
    let id = create(ctx, json!({ "name": "Conformance Created", "parentId": null })).await?;
    let fetched = get_one(ctx, &id).await;
    destroy(ctx, &id).await?;
    let fetched = fetched?;
    ensure_eq(&fetched["name"], &json!("Conformance Created"), None)?;
    ensure_eq(&fetched["parentId"], &Value::Null, None)?;
    Ok(())
});

body!(set_create_child, |ctx| {
    let parent = ctx.mailbox("folderB")?.to_string();
    let id = create(ctx, json!({ "name": "Conformance Child", "parentId": parent })).await?;
    let fetched = get_one(ctx, &id).await;
    destroy(ctx, &id).await?;
    ensure_eq(&fetched?["parentId"], &json!(parent), None)?;
    Ok(())
});

body!(set_create_missing_name, |ctx| {
    let resp = ctx
        .call("Mailbox/set", json!({ "create": { "new": { "parentId": null } } }))
        .await?;
    if let Some(id) = resp["created"]["new"]["id"].as_str() {
        destroy(ctx, id).await?;
    }
    let kind = set_error_type(&resp, "notCreated", "new")?;
    ensure_eq(&kind, &"invalidProperties", None)?;
    Ok(())
});

body!(set_update_rename, |ctx| {
    let id = create(ctx, json!({ "name": "Before Rename" })).await?;
    let resp = ctx
        .call(
            "Mailbox/set",
            json!({ "update": { id.as_str(): { "name": "After Rename" } } }),
        )
        .await;
    let fetched = get_one(ctx, &id).await;
    destroy(ctx, &id).await?;
    ensure_has_property(&resp?["updated"], &id, Some("rename must be listed in updated"))?;
    ensure_eq(&fetched?["name"], &json!("After Rename"), None)?;
    Ok(())
});

body!(set_destroy_empty, |ctx| {
    let id = create(ctx, json!({ "name": "To Destroy" })).await?;
    let resp = destroy(ctx, &id).await?;
    ensure_includes(&strings(&resp["destroyed"]), &id, None)?;
    let after = ctx.call("Mailbox/get", json!({ "ids": [id] })).await?;
    ensure_includes(&strings(&after["notFound"]), &id, None)?;
    Ok(())
});

body!(set_destroy_not_found, |ctx| {
    let resp = destroy(ctx, MISSING).await?;
    let kind = set_error_type(&resp, "notDestroyed", MISSING)?;
    ensure_eq(&kind, &"notFound", None)?;
    Ok(())
});

body!(set_cannot_destroy_with_children, |ctx| {
    let parent = ctx.mailbox("folderA")?.to_string();
    let resp = destroy(ctx, &parent).await?;
    let kind = set_error_type(&resp, "notDestroyed", &parent)?;
    ensure_eq(&kind, &"mailboxHasChild", None)?;
    ensure_eq(&get_one(ctx, &parent).await?["id"], &json!(parent), None)?;
    Ok(())
});
