// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::needs_cross_account;
use crate::support::{
    created_id, destroy_emails, ensure_changes_shape, expect_method_error, first, get_state, id_set,
    plain_email, set_error_type, strings,
};
use jct_core::Invocation;
use jct_runtime::assertions::{
    array, count, ensure, ensure_contains, ensure_deep_eq, ensure_eq, ensure_ge, ensure_gt,
    ensure_has_property, ensure_includes, ensure_len, ensure_matches, ensure_ne, ensure_type,
    is_truthy, string,
};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Map, Value, json};

const MISSING: &str = "nonexistent-email-xyz";
const UTC_DATE: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$";

/// Checks in the `email` category.
pub fn checks() -> Vec<TestDescriptor> {
    let get = Group::new("email", "RFC8621", "4.2");
    let query = Group::new("email", "RFC8621", "4.4");
    let set = Group::new("email", "RFC8621", "4.6");
    let import = Group::new("email", "RFC8621", "4.8");
    let changes = Group::new("email", "RFC8621", "4.3");
    let copy = Group::new("email", "RFC8621", "4.7");
    let parse = Group::new("email", "RFC8621", "4.9");
    vec![
        get.define("get-by-id", "Email/get returns the requested email", get_by_id),
        get.define("get-metadata-properties", "Email objects carry the metadata properties", get_metadata_properties)
            .section("4.1.1"),
        get.define("get-keywords", "Keywords set at import are returned", get_keywords)
            .section("4.1.1"),
        get.define("get-mailbox-ids", "mailboxIds lists every mailbox holding the email", get_mailbox_ids)
            .section("4.1.1"),
        get.define("get-not-found", "Unknown ids are reported in notFound", get_not_found),
        get.define("get-properties-filter", "properties limits the returned fields", get_properties_filter),
        get.define("get-received-at-utc", "receivedAt is a UTCDate", get_received_at_utc)
            .section("4.1.1"),
        query.define("query-basic", "Email/query returns the standard response shape", query_basic),
        query.define("query-in-mailbox", "inMailbox filter restricts results", query_in_mailbox)
            .section("4.4.1"),
        query.define("query-sort-received-at", "Sort by receivedAt descending", query_sort_received_at)
            .section("4.4.2"),
        query.define("query-paging-limit", "limit caps the number of ids", query_paging_limit)
            .rfc("RFC8620")
            .section("5.5"),
        query.define("query-paging-position", "position skips into the result list", query_paging_position)
            .rfc("RFC8620")
            .section("5.5"),
        query.define("query-calculate-total", "calculateTotal returns the full count", query_calculate_total)
            .rfc("RFC8620")
            .section("5.5"),
        set.define("set-update-add-keyword", "Patch adds a keyword", set_update_add_keyword),
        set.define("set-update-remove-keyword", "Patch removes a keyword", set_update_remove_keyword),
        set.define("set-update-mailbox-ids", "Patch files an email into another mailbox", set_update_mailbox_ids),
        set.define("set-update-not-found", "Updating an unknown email reports notFound", set_update_not_found),
        set.define("set-destroy-not-found", "Destroying an unknown email reports notFound", set_destroy_not_found),
        import.define("import-valid-message", "Email/import stores an uploaded message", import_valid_message),
        import.define("import-not-found-blob", "Importing an unknown blob fails with blobNotFound", import_not_found_blob),
        import.define("import-sets-keywords", "Email/import applies the given keywords", import_sets_keywords),
        changes.define("changes-no-changes", "Email/changes from the current state is empty", changes_no_changes),
        changes.define("changes-after-keyword-change", "A keyword change is reported as updated", changes_after_keyword_change),
        changes.define("changes-response-structure", "Email/changes returns the standard shape", changes_response_structure)
            .rfc("RFC8620")
            .section("5.2"),
        changes.define("changes-after-create-and-destroy", "Creation and destruction are reported in turn", changes_after_create_and_destroy),
        set.define("set-create-plain-text", "Email/set creates a text/plain email", set_create_plain_text),
        set.define("set-create-html", "Email/set creates a text/html email", set_create_html),
        set.define("set-create-multipart-alternative", "Email/set creates a multipart/alternative email", set_create_multipart_alternative),
        set.define("set-create-with-keywords", "Keywords given at creation are stored", set_create_with_keywords),
        set.define("set-create-server-set-properties", "Creation returns the server-set properties", set_create_server_set_properties),
        set.define("set-create-rejects-server-set-id", "Supplying a server-set property fails with invalidProperties", set_create_rejects_server_set_id),
        set.define("set-create-with-attachment", "A blobId part becomes an attachment", set_create_with_attachment),
        set.define("set-create-state-changes", "Creating an email changes the state", set_create_state_changes),
        set.define("set-create-creation-id-reference", "A creation id names a mailbox created earlier in the request", set_create_creation_id_reference)
            .rfc("RFC8620")
            .section("5.3"),
        copy.define("copy-same-account-error", "Email/copy within one account is invalidArguments", copy_same_account_error),
        copy.define("copy-cross-account", "Email/copy copies an email into another account", copy_cross_account)
            .skip_if(needs_cross_account),
        copy.define("copy-not-found", "Copying an unknown email fails in notCreated", copy_not_found)
            .skip_if(needs_cross_account),
        parse.define("parse-valid-message", "Email/parse parses an uploaded message", parse_valid_message),
        parse.define("parse-null-metadata", "Parsed emails have null metadata", parse_null_metadata),
        parse.define("parse-not-found", "Unknown blobs are reported in notFound", parse_not_found),
        parse.define("parse-not-parsable", "A blob that is not a message is reported in notParsable", parse_not_parsable)
            .recommended(),
        parse.define("parse-body-values", "fetchTextBodyValues returns the text body", parse_body_values),
        parse.define("parse-response-structure", "Email/parse returns the standard shape", parse_response_structure),
    ]
}

async fn get_one(ctx: &RunContext, id: &str, properties: &[&str]) -> anyhow::Result<Value> {
    let resp = ctx
        .call("Email/get", json!({ "ids": [id], "properties": properties }))
        .await?;
    Ok(first(&resp, "Email/get")?.clone())
}

async fn update(ctx: &RunContext, id: &str, patch: Value) -> anyhow::Result<Value> {
    let mut update = Map::new();
    update.insert(id.to_string(), patch);
    Ok(ctx.call("Email/set", json!({ "update": update })).await?)
}

async fn folder_ids(ctx: &RunContext, mailbox: &str) -> anyhow::Result<Vec<String>> {
    let resp = ctx
        .call(
            "Email/query",
            json!({
                "filter": { "inMailbox": mailbox },
                "sort": [{ "property": "receivedAt", "isAscending": false }],
            }),
        )
        .await?;
    Ok(strings(&resp["ids"]))
}

fn test_message(subject: &str) -> Vec<u8> {
    [
        "From: Conformance <conformance@example.com>",
        "To: testuser@example.com",
        &format!("Subject: {subject}"),
        "Date: Mon, 02 Feb 2026 10:00:00 +0000",
        &format!("Message-ID: <{}@test>", subject.to_ascii_lowercase().replace(' ', "-")),
        "MIME-Version: 1.0",
        "Content-Type: text/plain; charset=utf-8",
        "",
        "Imported by the conformance run.",
    ]
    .join("\r\n")
    .into_bytes()
}

/// Upload and import `subject` into `folderA`, returning the new id.
async fn import(ctx: &RunContext, subject: &str, keywords: &[&str]) -> anyhow::Result<(String, Value)> {
    let folder = ctx.mailbox("folderA")?.to_string();
    let blob = ctx
        .client
        .upload(test_message(subject), "message/rfc822", None)
        .await?;
    let resp = ctx
        .call(
            "Email/import",
            json!({
                "emails": {
                    "imp": {
                        "blobId": blob.blob_id,
                        "mailboxIds": id_set([folder.as_str()]),
                        "keywords": id_set(keywords.iter().copied()),
                        "receivedAt": "2026-02-02T10:00:00Z",
                    }
                }
            }),
        )
        .await?;
    Ok((created_id(&resp, "imp")?, resp))
}

async fn destroy(ctx: &RunContext, id: &str) -> anyhow::Result<()> {
    ctx.call("Email/set", json!({ "destroy": [id] })).await?;
    Ok(())
}

// ── Email/get ───────────────────────────────────────────────────────

body!(get_by_id, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let resp = ctx.call("Email/get", json!({ "ids": [id] })).await?;
    let list = array(&resp["list"], "list")?;
    ensure_len(list, 1, None)?;
    ensure_eq(&list[0]["id"], &json!(id), None)?;
    ensure_eq(&list[0]["subject"], &json!("Meeting tomorrow morning"), None)?;
    ensure_type(&resp["state"], "string", None)?;
    Ok(())
});

body!(get_metadata_properties, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let email = get_one(
        ctx,
        &id,
        &["id", "blobId", "threadId", "mailboxIds", "keywords", "size", "receivedAt"],
    )
    .await?;
    ensure_type(&email["id"], "string", None)?;
    ensure_type(&email["blobId"], "string", None)?;
    ensure_type(&email["threadId"], "string", None)?;
    ensure_type(&email["mailboxIds"], "object", None)?;
    ensure_type(&email["keywords"], "object", None)?;
    ensure_type(&email["size"], "number", None)?;
    ensure_type(&email["receivedAt"], "string", None)?;
    Ok(())
});

body!(get_keywords, |ctx| {
    let id = ctx.email("custom-keywords")?.to_string();
    let email = get_one(ctx, &id, &["keywords"]).await?;
    ensure_deep_eq(
        &email["keywords"],
        &json!({ "$seen": true, "$forwarded": true, "custom_label": true }),
        None,
    )?;
    Ok(())
});

body!(get_mailbox_ids, |ctx| {
    let id = ctx.email("multi-mailbox")?.to_string();
    let inbox = ctx.role("inbox")?.to_string();
    let folder = ctx.mailbox("folderA")?.to_string();
    let email = get_one(ctx, &id, &["mailboxIds"]).await?;
    ensure_deep_eq(
        &email["mailboxIds"],
        &id_set([inbox.as_str(), folder.as_str()]),
        None,
    )?;
    Ok(())
});

body!(get_not_found, |ctx| {
    let resp = ctx.call("Email/get", json!({ "ids": [MISSING] })).await?;
    ensure_len(array(&resp["list"], "list")?, 0, None)?;
    ensure_includes(&strings(&resp["notFound"]), &MISSING.to_string(), None)?;
    Ok(())
});

body!(get_properties_filter, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let email = get_one(ctx, &id, &["subject"]).await?;
    ensure_has_property(&email, "id", Some("id is always returned"))?;
    ensure_has_property(&email, "subject", None)?;
    ensure(email.get("receivedAt").is_none(), "receivedAt was not requested")?;
    ensure(email.get("keywords").is_none(), "keywords was not requested")?;
    Ok(())
});

body!(get_received_at_utc, |ctx| {
    let id = ctx.email("sort-test-1")?.to_string();
    let email = get_one(ctx, &id, &["receivedAt"]).await?;
    let received = email["receivedAt"].as_str().unwrap_or_default();
    ensure_matches(received, UTC_DATE, None)?;
    Ok(())
});

// ── Email/query ─────────────────────────────────────────────────────

body!(query_basic, |ctx| {
    let resp = ctx.call("Email/query", json!({})).await?;
    ensure_type(&resp["ids"], "array", None)?;
    ensure_type(&resp["queryState"], "string", None)?;
    ensure_type(&resp["canCalculateChanges"], "boolean", None)?;
    ensure_eq(&resp["position"], &json!(0), None)?;
    ensure_ge(
        strings(&resp["ids"]).len(),
        ctx.email_ids.len(),
        Some("query must return every fixture email"),
    )?;
    Ok(())
});

body!(query_in_mailbox, |ctx| {
    let folder = ctx.mailbox("folderB")?.to_string();
    let ids = folder_ids(ctx, &folder).await?;
    ensure_len(&ids, 4, None)?;
    for key in ["large-email", "sort-test-1", "sort-test-2", "sort-test-3"] {
        ensure_includes(&ids, &ctx.email(key)?.to_string(), None)?;
    }
    Ok(())
});

body!(query_sort_received_at, |ctx| {
    let folder = ctx.mailbox("folderB")?.to_string();
    let ids = folder_ids(ctx, &folder).await?;
    let mut expected = Vec::new();
    for key in ["sort-test-3", "sort-test-2", "sort-test-1", "large-email"] {
        expected.push(ctx.email(key)?.to_string());
    }
    ensure_eq(&ids, &expected, Some("newest first"))?;
    Ok(())
});

body!(query_paging_limit, |ctx| {
    let resp = ctx.call("Email/query", json!({ "limit": 2 })).await?;
    ensure_len(&strings(&resp["ids"]), 2, None)?;
    Ok(())
});

body!(query_paging_position, |ctx| {
    let folder = ctx.mailbox("folderB")?.to_string();
    let all = folder_ids(ctx, &folder).await?;
    let resp = ctx
        .call(
            "Email/query",
            json!({
                "filter": { "inMailbox": folder },
                "sort": [{ "property": "receivedAt", "isAscending": false }],
                "position": 1,
                "limit": 2,
            }),
        )
        .await?;
    ensure_eq(&resp["position"], &json!(1), None)?;
    let page = strings(&resp["ids"]);
    ensure(all.len() >= 3, "folderB must hold at least three emails")?;
    ensure_eq(page.as_slice(), &all[1..3], None)?;
    Ok(())
});

body!(query_calculate_total, |ctx| {
    let folder = ctx.mailbox("folderB")?.to_string();
    let resp = ctx
        .call(
            "Email/query",
            json!({ "filter": { "inMailbox": folder }, "limit": 1, "calculateTotal": true }),
        )
        .await?;
    ensure_eq(&count(&resp["total"], "total")?, &4, None)?;
    ensure_len(&strings(&resp["ids"]), 1, None)?;
    Ok(())
});

// ── Email/set ───────────────────────────────────────────────────────

body!(set_update_add_keyword, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let resp = update(ctx, &id, json!({ "keywords/$flagged": true })).await?;
    ensure_has_property(&resp["updated"], &id, None)?;
    let email = get_one(ctx, &id, &["keywords"]).await?;
    update(ctx, &id, json!({ "keywords/$flagged": null })).await?;
    ensure_eq(&email["keywords"]["$flagged"], &json!(true), None)?;
    ensure_eq(&email["keywords"]["$seen"], &json!(true), Some("existing keywords are kept"))?;
    Ok(())
});

body!(set_update_remove_keyword, |ctx| {
    let id = ctx.email("html-attachment")?.to_string();
    let resp = update(ctx, &id, json!({ "keywords/$flagged": null })).await?;
    ensure_has_property(&resp["updated"], &id, None)?;
    let email = get_one(ctx, &id, &["keywords"]).await?;
    update(ctx, &id, json!({ "keywords/$flagged": true })).await?;
    ensure(
        email["keywords"].get("$flagged").is_none(),
        "$flagged must be gone",
    )?;
    ensure_eq(&email["keywords"]["$seen"], &json!(true), None)?;
    Ok(())
});

body!(set_update_mailbox_ids, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let folder = ctx.mailbox("folderB")?.to_string();
    let path = format!("mailboxIds/{folder}");
    let mut patch = Map::new();
    patch.insert(path.clone(), Value::Bool(true));
    update(ctx, &id, Value::Object(patch.clone())).await?;
    let email = get_one(ctx, &id, &["mailboxIds"]).await?;
    patch.insert(path, Value::Null);
    update(ctx, &id, Value::Object(patch)).await?;
    ensure_eq(&email["mailboxIds"][folder.as_str()], &json!(true), None)?;
    ensure_eq(
        &email["mailboxIds"].as_object().map_or(0, Map::len),
        &2,
        Some("the inbox membership is kept"),
    )?;
    Ok(())
});

body!(set_update_not_found, |ctx| {
    let resp = update(ctx, MISSING, json!({ "keywords/$seen": true })).await?;
    let kind = set_error_type(&resp, "notUpdated", MISSING)?;
    ensure_eq(&kind, &"notFound", None)?;
    Ok(())
});

body!(set_destroy_not_found, |ctx| {
    let resp = ctx.call("Email/set", json!({ "destroy": [MISSING] })).await?;
    let kind = set_error_type(&resp, "notDestroyed", MISSING)?;
    ensure_eq(&kind, &"notFound", None)?;
    Ok(())
});

// ── Email/import ────────────────────────────────────────────────────

body!(import_valid_message, |ctx| {
    let (id, resp) = import(ctx, "Conformance Import", &[]).await?;
    let created = &resp["created"]["imp"];
    let email = get_one(ctx, &id, &["subject", "blobId", "threadId", "size"]).await;
    destroy(ctx, &id).await?;
    ensure_type(&created["blobId"], "string", None)?;
    ensure_type(&created["threadId"], "string", None)?;
    ensure_type(&created["size"], "number", None)?;
    ensure_eq(&email?["subject"], &json!("Conformance Import"), None)?;
    Ok(())
});

body!(import_not_found_blob, |ctx| {
    let folder = ctx.mailbox("folderA")?.to_string();
    let resp = ctx
        .call(
            "Email/import",
            json!({
                "emails": {
                    "imp": { "blobId": "nonexistent-blob-xyz", "mailboxIds": id_set([folder.as_str()]) }
                }
            }),
        )
        .await?;
    let kind = set_error_type(&resp, "notCreated", "imp")?;
    ensure_eq(&kind, &"blobNotFound", None)?;
    Ok(())
});

body!(import_sets_keywords, |ctx| {
    let (id, _) = import(ctx, "Conformance Keywords", &["$seen", "$flagged"]).await?;
    let email = get_one(ctx, &id, &["keywords"]).await;
    destroy(ctx, &id).await?;
    ensure_deep_eq(
        &email?["keywords"],
        &json!({ "$seen": true, "$flagged": true }),
        None,
    )?;
    Ok(())
});

// ── Email/changes ───────────────────────────────────────────────────

async fn changes_since(ctx: &RunContext, since: &str) -> anyhow::Result<Value> {
    Ok(ctx.call("Email/changes", json!({ "sinceState": since })).await?)
}

body!(changes_no_changes, |ctx| {
    let state = get_state(ctx, "Email").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_eq(&resp["oldState"], &json!(state), None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_len(array(&resp[list], list)?, 0, None)?;
    }
    Ok(())
});

body!(changes_after_keyword_change, |ctx| {
    let id = ctx.email("plain-simple")?.to_string();
    let state = get_state(ctx, "Email").await?;
    update(ctx, &id, json!({ "keywords/$flagged": true })).await?;
    let resp = changes_since(ctx, &state).await;
    update(ctx, &id, json!({ "keywords/$flagged": null })).await?;
    let resp = resp?;
    ensure_includes(&strings(&resp["updated"]), &id, None)?;
    ensure_ne(&resp["newState"], &json!(state), None)?;
    Ok(())
});

body!(changes_response_structure, |ctx| {
    let state = get_state(ctx, "Email").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_changes_shape(&resp)?;
    Ok(())
});

body!(changes_after_create_and_destroy, |ctx| {
    let folder = ctx.mailbox("folderA")?.to_string();
    let before = get_state(ctx, "Email").await?;
    let created = ctx
        .call(
            "Email/set",
            json!({ "create": { "tmp": plain_email(&folder, "Changes lifecycle", "Short lived.") } }),
        )
        .await?;
    let id = created_id(&created, "tmp")?;
    let after_create = string(&created["newState"], "newState")?.to_string();
    let first_changes = changes_since(ctx, &before).await;
    destroy_emails(ctx, &[&id]).await?;
    ensure_includes(&strings(&first_changes?["created"]), &id, None)?;
    let second_changes = changes_since(ctx, &after_create).await?;
    ensure_includes(&strings(&second_changes["destroyed"]), &id, None)?;
    Ok(())
});

// ── Email/set create ────────────────────────────────────────────────

/// Create `props` under creation key `key`, returning the whole response.
async fn create(ctx: &RunContext, key: &str, props: Value) -> anyhow::Result<Value> {
    let mut create = Map::new();
    create.insert(key.to_string(), props);
    Ok(ctx.call("Email/set", json!({ "create": create })).await?)
}

fn body_part(part_id: &str, mime_type: &str) -> Value {
    json!({ "partId": part_id, "type": mime_type })
}

body!(set_create_plain_text, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let props = plain_email(&inbox, "Plain text creation", "A plain text body created with Email/set.");
    let resp = create(ctx, "plain", props).await?;
    let id = created_id(&resp, "plain")?;
    let fetched = ctx
        .call(
            "Email/get",
            json!({
                "ids": [id],
                "properties": ["subject", "textBody", "bodyValues"],
                "fetchTextBodyValues": true,
            }),
        )
        .await;
    destroy_emails(ctx, &[&id]).await?;
    let fetched = fetched?;
    let email = first(&fetched, "Email/get")?;
    ensure_eq(&email["subject"], &json!("Plain text creation"), None)?;
    let part_id = string(&email["textBody"][0]["partId"], "textBody partId")?;
    let value = string(&email["bodyValues"][part_id]["value"], "body value")?;
    ensure_contains(value, "plain text body", None)?;
    Ok(())
});

body!(set_create_html, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let mut props = plain_email(&inbox, "HTML creation", "");
    props["bodyStructure"] = body_part("1", "text/html");
    props["bodyValues"] = json!({ "1": { "value": "<html><body><p>Rich <b>body</b></p></body></html>" } });
    let resp = create(ctx, "html", props).await?;
    let id = created_id(&resp, "html")?;
    let fetched = ctx
        .call(
            "Email/get",
            json!({ "ids": [id], "properties": ["htmlBody"], "bodyProperties": ["partId", "type"] }),
        )
        .await;
    destroy_emails(ctx, &[&id]).await?;
    let fetched = fetched?;
    let email = first(&fetched, "Email/get")?;
    ensure_eq(&email["htmlBody"][0]["type"], &json!("text/html"), None)?;
    Ok(())
});

body!(set_create_multipart_alternative, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let mut props = plain_email(&inbox, "Multipart alternative creation", "");
    props["bodyStructure"] = json!({
        "type": "multipart/alternative",
        "subParts": [body_part("text", "text/plain"), body_part("html", "text/html")],
    });
    props["bodyValues"] = json!({
        "text": { "value": "Plain version" },
        "html": { "value": "<html><body><p>HTML version</p></body></html>" },
    });
    let resp = create(ctx, "alt", props).await?;
    let id = created_id(&resp, "alt")?;
    let fetched = ctx
        .call(
            "Email/get",
            json!({ "ids": [id], "properties": ["textBody", "htmlBody"], "bodyProperties": ["type"] }),
        )
        .await;
    destroy_emails(ctx, &[&id]).await?;
    let fetched = fetched?;
    let email = first(&fetched, "Email/get")?;
    ensure_eq(&email["textBody"][0]["type"], &json!("text/plain"), None)?;
    ensure_eq(&email["htmlBody"][0]["type"], &json!("text/html"), None)?;
    Ok(())
});

body!(set_create_with_keywords, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let mut props = plain_email(&inbox, "Keywords at creation", "body");
    props["keywords"] = json!({ "$draft": true, "$seen": true });
    let resp = create(ctx, "kw", props).await?;
    let id = created_id(&resp, "kw")?;
    let email = get_one(ctx, &id, &["keywords"]).await;
    destroy_emails(ctx, &[&id]).await?;
    ensure_deep_eq(&email?["keywords"], &json!({ "$draft": true, "$seen": true }), None)?;
    Ok(())
});

body!(set_create_server_set_properties, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let resp = create(ctx, "ssp", plain_email(&inbox, "Server-set properties", "body")).await?;
    let id = created_id(&resp, "ssp")?;
    destroy_emails(ctx, &[&id]).await?;
    let created = &resp["created"]["ssp"];
    ensure_type(&created["blobId"], "string", Some("blobId must be server-set"))?;
    ensure_type(&created["threadId"], "string", Some("threadId must be server-set"))?;
    ensure_type(&created["size"], "number", None)?;
    Ok(())
});

body!(set_create_rejects_server_set_id, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let mut props = plain_email(&inbox, "Client-chosen id", "body");
    props["id"] = json!("client-chosen-id");
    let resp = create(ctx, "bad", props).await?;
    if let Ok(id) = created_id(&resp, "bad") {
        destroy_emails(ctx, &[&id]).await?;
    }
    let kind = set_error_type(&resp, "notCreated", "bad")?;
    ensure_eq(&kind, &"invalidProperties", None)?;
    Ok(())
});

body!(set_create_with_attachment, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let pdf = ctx.blob("pdf")?.to_string();
    let mut props = plain_email(&inbox, "With attachment", "");
    props["bodyStructure"] = json!({
        "type": "multipart/mixed",
        "subParts": [
            body_part("text", "text/plain"),
            { "type": "application/pdf", "blobId": pdf, "name": "test.pdf", "disposition": "attachment" },
        ],
    });
    props["bodyValues"] = json!({ "text": { "value": "See attached PDF." } });
    let resp = create(ctx, "att", props).await?;
    let id = created_id(&resp, "att")?;
    let fetched = ctx
        .call(
            "Email/get",
            json!({
                "ids": [id],
                "properties": ["hasAttachment", "attachments"],
                "bodyProperties": ["type", "name"],
            }),
        )
        .await;
    destroy_emails(ctx, &[&id]).await?;
    let fetched = fetched?;
    let email = first(&fetched, "Email/get")?;
    ensure_eq(&email["hasAttachment"], &json!(true), None)?;
    let attachments = array(&email["attachments"], "attachments")?;
    ensure(
        attachments.iter().any(|a| a["name"] == "test.pdf"),
        "test.pdf must be listed as an attachment",
    )?;
    Ok(())
});

body!(set_create_state_changes, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let resp = create(ctx, "st", plain_email(&inbox, "State change", "body")).await?;
    let id = created_id(&resp, "st")?;
    destroy_emails(ctx, &[&id]).await?;
    ensure_type(&resp["oldState"], "string", None)?;
    ensure_type(&resp["newState"], "string", None)?;
    ensure_ne(&resp["oldState"], &resp["newState"], Some("creation must move the state"))?;
    Ok(())
});

body!(set_create_creation_id_reference, |ctx| {
    let mut email = plain_email("placeholder", "Creation reference", "body");
    email["mailboxIds"] = json!({ "#newMb": true });
    let resp = ctx
        .client
        .raw_request(
            ctx.client.default_using(),
            vec![
                Invocation::new(
                    "Mailbox/set",
                    json!({
                        "accountId": ctx.account_id,
                        "create": { "newMb": { "name": "Creation Ref Test", "parentId": null } },
                    }),
                    "mb",
                ),
                Invocation::new(
                    "Email/set",
                    json!({ "accountId": ctx.account_id, "create": { "refEmail": email } }),
                    "em",
                ),
            ],
        )
        .await?;
    let mailbox = resp
        .by_call_id("mb")
        .and_then(|r| r.args()["created"]["newMb"]["id"].as_str().map(str::to_string));
    let created = resp
        .by_call_id("em")
        .and_then(|r| r.args()["created"]["refEmail"]["id"].as_str().map(str::to_string));
    if let Some(id) = &created {
        destroy_emails(ctx, &[id]).await?;
    }
    if let Some(id) = &mailbox {
        ctx.call("Mailbox/set", json!({ "destroy": [id] })).await?;
    }
    ensure(mailbox.is_some(), "the mailbox must be created")?;
    ensure(created.is_some(), "the email must be created in the new mailbox")?;
    Ok(())
});

// ── Email/copy ──────────────────────────────────────────────────────

/// Inbox (or first mailbox) of the cross account.
async fn cross_target(ctx: &RunContext) -> anyhow::Result<(String, String)> {
    let target = ctx
        .cross_account_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no cross account"))?;
    let resp = ctx
        .client
        .call("Mailbox/get", json!({ "accountId": target, "ids": null }))
        .await?;
    let mailboxes = array(&resp["list"], "cross account mailboxes")?;
    let mailbox = mailboxes
        .iter()
        .find(|m| m["role"] == "inbox")
        .or_else(|| mailboxes.first())
        .and_then(|m| m["id"].as_str())
        .ok_or_else(|| anyhow::anyhow!("cross account has no mailbox"))?
        .to_string();
    Ok((target, mailbox))
}

body!(copy_same_account_error, |ctx| {
    let inbox = ctx.role("inbox")?.to_string();
    let source = ctx.email("plain-simple")?.to_string();
    let result = ctx
        .client
        .call(
            "Email/copy",
            json!({
                "fromAccountId": ctx.account_id,
                "accountId": ctx.account_id,
                "create": { "x": { "id": source, "mailboxIds": id_set([inbox.as_str()]) } },
            }),
        )
        .await;
    expect_method_error(result, "invalidArguments")
});

body!(copy_cross_account, |ctx| {
    let (target, mailbox) = cross_target(ctx).await?;
    let inbox = ctx.role("inbox")?.to_string();
    let resp = create(ctx, "src", plain_email(&inbox, "Cross-account copy source", "body to copy")).await?;
    let source = created_id(&resp, "src")?;
    let copied = ctx
        .client
        .call(
            "Email/copy",
            json!({
                "fromAccountId": ctx.account_id,
                "accountId": target,
                "create": {
                    "copied": {
                        "id": source,
                        "mailboxIds": id_set([mailbox.as_str()]),
                        "keywords": { "$seen": true },
                    }
                },
            }),
        )
        .await;
    destroy_emails(ctx, &[&source]).await?;
    let copied = copied?;
    let id = created_id(&copied, "copied")?;
    ctx.client
        .call("Email/set", json!({ "accountId": target, "destroy": [id] }))
        .await?;
    Ok(())
});

body!(copy_not_found, |ctx| {
    let (target, mailbox) = cross_target(ctx).await?;
    let resp = ctx
        .client
        .call(
            "Email/copy",
            json!({
                "fromAccountId": ctx.account_id,
                "accountId": target,
                "create": { "bad": { "id": MISSING, "mailboxIds": id_set([mailbox.as_str()]) } },
            }),
        )
        .await?;
    let kind = set_error_type(&resp, "notCreated", "bad")?;
    ensure_eq(&kind, &"notFound", None)?;
    Ok(())
});

// ── Email/parse ─────────────────────────────────────────────────────

fn parse_message(subject: &str, sender: &str, body: &str) -> Vec<u8> {
    [
        &format!("From: {sender}"),
        "To: testuser@example.com",
        &format!("Subject: {subject}"),
        "Date: Tue, 03 Feb 2026 09:00:00 +0000",
        "Message-ID: <parse-check@test>",
        "MIME-Version: 1.0",
        "Content-Type: text/plain; charset=utf-8",
        "",
        body,
    ]
    .join("\r\n")
    .into_bytes()
}

async fn upload_message(ctx: &RunContext, raw: Vec<u8>) -> anyhow::Result<String> {
    Ok(ctx.client.upload(raw, "message/rfc822", None).await?.blob_id)
}

async fn parse_blob(ctx: &RunContext, blob_id: &str, extra: Value) -> anyhow::Result<Value> {
    let mut args = json!({ "blobIds": [blob_id] });
    if let (Some(args), Value::Object(extra)) = (args.as_object_mut(), extra) {
        args.extend(extra);
    }
    Ok(ctx.call("Email/parse", args).await?)
}

body!(parse_valid_message, |ctx| {
    let raw = parse_message("Parse test message", "Parser <parse@example.com>", "Parse me.");
    let blob = upload_message(ctx, raw).await?;
    let resp = parse_blob(ctx, &blob, json!({})).await?;
    let email = &resp["parsed"][blob.as_str()];
    ensure(is_truthy(email), format!("{blob} must be in parsed"))?;
    ensure_eq(&email["subject"], &json!("Parse test message"), None)?;
    ensure_eq(&email["from"][0]["email"], &json!("parse@example.com"), None)?;
    Ok(())
});

body!(parse_null_metadata, |ctx| {
    let raw = parse_message("Metadata parse test", "meta@example.com", "No metadata here.");
    let blob = upload_message(ctx, raw).await?;
    let resp = parse_blob(
        ctx,
        &blob,
        json!({ "properties": ["id", "threadId", "mailboxIds", "keywords", "receivedAt", "subject"] }),
    )
    .await?;
    let email = &resp["parsed"][blob.as_str()];
    for key in ["id", "threadId", "mailboxIds", "keywords", "receivedAt"] {
        ensure_eq(&email[key], &Value::Null, Some(key))?;
    }
    ensure_eq(&email["subject"], &json!("Metadata parse test"), None)?;
    Ok(())
});

body!(parse_not_found, |ctx| {
    let resp = parse_blob(ctx, "nonexistent-blob-xyz", json!({})).await?;
    ensure_includes(&strings(&resp["notFound"]), &"nonexistent-blob-xyz".to_string(), None)?;
    Ok(())
});

body!(parse_not_parsable, |ctx| {
    let blob = ctx
        .client
        .upload(
            b"this is not an email at all, just random text".to_vec(),
            "application/octet-stream",
            None,
        )
        .await?
        .blob_id;
    let resp = parse_blob(ctx, &blob, json!({})).await?;
    ensure_includes(&strings(&resp["notParsable"]), &blob, None)?;
    Ok(())
});

body!(parse_body_values, |ctx| {
    let raw = parse_message("Body values parse", "bv@example.com", "The body content for parsing.");
    let blob = upload_message(ctx, raw).await?;
    let resp = parse_blob(
        ctx,
        &blob,
        json!({
            "properties": ["textBody", "bodyValues"],
            "bodyProperties": ["partId"],
            "fetchTextBodyValues": true,
        }),
    )
    .await?;
    let values = resp["parsed"][blob.as_str()]["bodyValues"]
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("bodyValues must be an object"))?;
    ensure_gt(values.len(), 0, None)?;
    let value = values
        .values()
        .filter_map(|v| v["value"].as_str())
        .next()
        .unwrap_or_default();
    ensure_contains(value, "body content for parsing", None)?;
    Ok(())
});

body!(parse_response_structure, |ctx| {
    let blob = upload_message(ctx, b"From: x@example.com\r\nTo: y@example.com\r\nSubject: test\r\n\r\nbody".to_vec()).await?;
    let resp = parse_blob(ctx, &blob, json!({})).await?;
    ensure_type(&resp["accountId"], "string", None)?;
    ensure(
        resp.get("parsed").is_some() || resp.get("notParsable").is_some(),
        "parsed or notParsable must be present",
    )?;
    Ok(())
});
