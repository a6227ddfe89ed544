// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::{needs_identity, needs_submission};
use crate::support::{ensure_changes_shape, first, get_state, set_error_type, strings};
use jct_runtime::assertions::{
    array, ensure, ensure_contains, ensure_eq, ensure_has_property, ensure_includes, ensure_len,
    ensure_type, string,
};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Map, Value, json};

/// Checks in the `identity` category.
pub fn checks() -> Vec<TestDescriptor> {
    let get = Group::new("identity", "RFC8621", "6.1");
    let changes = Group::new("identity", "RFC8621", "6.2");
    let set = Group::new("identity", "RFC8621", "6.3");
    vec![
        get.define("get-all", "Identity/get with null ids returns the account's identities", get_all)
            .skip_if(needs_submission),
        get.define("get-properties", "Identity objects carry the standard properties", get_properties)
            .section("6")
            .skip_if(needs_identity),
        get.define("get-by-id", "Identity/get returns a requested identity", get_by_id)
            .skip_if(needs_identity),
        changes.define("changes-no-changes", "Identity/changes from the current state is empty", changes_no_changes)
            .skip_if(needs_submission),
        changes.define("changes-after-update", "An identity update is reported as updated", changes_after_update)
            .skip_if(needs_identity),
        changes.define("changes-response-structure", "Identity/changes returns the standard shape", changes_response_structure)
            .rfc("RFC8620")
            .section("5.2")
            .skip_if(needs_submission),
        set.define("set-update-name", "Identity/set updates the name", set_update_name)
            .skip_if(needs_identity),
        set.define("set-update-text-signature", "Identity/set updates textSignature", set_update_text_signature)
            .skip_if(needs_identity),
        set.define("set-update-html-signature", "Identity/set updates htmlSignature", set_update_html_signature)
            .skip_if(needs_identity),
        set.define("set-update-reply-to", "Identity/set updates replyTo", set_update_reply_to)
            .skip_if(needs_identity),
        set.define("set-not-found", "Updating an unknown identity reports notFound", set_not_found)
            .skip_if(needs_submission),
    ]
}

body!(get_all, |ctx| {
    let resp = ctx.call("Identity/get", json!({ "ids": null })).await?;
    ensure_type(&resp["state"], "string", None)?;
    for identity in array(&resp["list"], "list")? {
        ensure_type(&identity["id"], "string", None)?;
        ensure_type(&identity["email"], "string", None)?;
    }
    Ok(())
});

body!(get_properties, |ctx| {
    let id = ctx.identity_ids[0].clone();
    let resp = ctx.call("Identity/get", json!({ "ids": [id] })).await?;
    let identity = first(&resp, "Identity/get")?;
    ensure_type(&identity["name"], "string", None)?;
    ensure_type(&identity["email"], "string", None)?;
    for key in ["replyTo", "bcc", "textSignature", "htmlSignature"] {
        ensure_has_property(identity, key, None)?;
    }
    ensure_type(&identity["mayDelete"], "boolean", None)?;
    Ok(())
});

body!(get_by_id, |ctx| {
    let id = ctx.identity_ids[0].clone();
    let resp = ctx.call("Identity/get", json!({ "ids": [id] })).await?;
    let list = array(&resp["list"], "list")?;
    ensure(
        list.iter().any(|i| i["id"] == id.as_str()),
        format!("identity {id} missing from list"),
    )?;
    let email = list.iter().find(|i| i["id"] == id.as_str()).map(|i| &i["email"]);
    ensure_eq(&email, &Some(&json!(ctx.identity_email)), None)?;
    Ok(())
});

// ── Identity/changes ────────────────────────────────────────────────

async fn changes_since(ctx: &RunContext, since: &str) -> anyhow::Result<Value> {
    Ok(ctx.call("Identity/changes", json!({ "sinceState": since })).await?)
}

body!(changes_no_changes, |ctx| {
    let state = get_state(ctx, "Identity").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_eq(&resp["oldState"], &json!(state), None)?;
    for list in ["created", "updated", "destroyed"] {
        ensure_len(array(&resp[list], list)?, 0, None)?;
    }
    Ok(())
});

body!(changes_after_update, |ctx| {
    let id = ctx.identity_ids[0].clone();
    let state = get_state(ctx, "Identity").await?;
    let saved = with_patch(ctx, &id, json!({ "textSignature": "Changes check" }), |_| Ok(())).await;
    let resp = changes_since(ctx, &state).await?;
    saved?;
    ensure_includes(&strings(&resp["updated"]), &id, None)?;
    Ok(())
});

body!(changes_response_structure, |ctx| {
    let state = get_state(ctx, "Identity").await?;
    let resp = changes_since(ctx, &state).await?;
    ensure_changes_shape(&resp)?;
    Ok(())
});

// ── Identity/set ────────────────────────────────────────────────────

async fn fetch_identity(ctx: &RunContext, id: &str) -> anyhow::Result<Value> {
    let resp = ctx.call("Identity/get", json!({ "ids": [id] })).await?;
    Ok(first(&resp, "Identity/get")?.clone())
}

async fn update_identity(ctx: &RunContext, id: &str, patch: Value) -> anyhow::Result<Value> {
    let mut update = Map::new();
    update.insert(id.to_string(), patch);
    Ok(ctx.call("Identity/set", json!({ "update": update })).await?)
}

/// Apply `patch` to identity `id`, run `verify` on the re-fetched
/// identity, then put the patched properties back.
async fn with_patch<F>(ctx: &RunContext, id: &str, patch: Value, verify: F) -> anyhow::Result<()>
where
    F: FnOnce(&Value) -> anyhow::Result<()>,
{
    let original = fetch_identity(ctx, id).await?;
    let restore: Map<String, Value> = patch
        .as_object()
        .into_iter()
        .flatten()
        .map(|(key, _)| (key.clone(), original[key.as_str()].clone()))
        .collect();
    let resp = update_identity(ctx, id, patch).await?;
    let outcome = match resp["updated"].get(id) {
        Some(_) => {
            let fetched = fetch_identity(ctx, id).await?;
            verify(&fetched)
        }
        None => Err(anyhow::anyhow!("identity {id} was not updated: {}", resp["notUpdated"][id])),
    };
    update_identity(ctx, id, Value::Object(restore)).await?;
    outcome
}

body!(set_update_name, |ctx| {
    let id = ctx.identity_ids[0].clone();
    with_patch(ctx, &id, json!({ "name": "Conformance Updated Name" }), |identity| {
        ensure_eq(&identity["name"], &json!("Conformance Updated Name"), None)?;
        Ok(())
    })
    .await
});

body!(set_update_text_signature, |ctx| {
    let id = ctx.identity_ids[0].clone();
    with_patch(ctx, &id, json!({ "textSignature": "-- \nConformance Signature" }), |identity| {
        ensure_contains(string(&identity["textSignature"], "textSignature")?, "Conformance Signature", None)?;
        Ok(())
    })
    .await
});

body!(set_update_html_signature, |ctx| {
    let id = ctx.identity_ids[0].clone();
    let html = "<p>-- <br/><b>Conformance HTML Signature</b></p>";
    with_patch(ctx, &id, json!({ "htmlSignature": html }), |identity| {
        ensure_contains(string(&identity["htmlSignature"], "htmlSignature")?, "HTML Signature", None)?;
        Ok(())
    })
    .await
});

body!(set_update_reply_to, |ctx| {
    let id = ctx.identity_ids[0].clone();
    let reply_to = json!([{ "name": "Reply Handler", "email": "reply@example.com" }]);
    with_patch(ctx, &id, json!({ "replyTo": reply_to }), |identity| {
        let list = array(&identity["replyTo"], "replyTo")?;
        ensure_len(list, 1, None)?;
        ensure_eq(&list[0]["email"], &json!("reply@example.com"), None)?;
        Ok(())
    })
    .await
});

body!(set_not_found, |ctx| {
    let missing = "nonexistent-identity-xyz";
    let resp = update_identity(ctx, missing, json!({ "name": "Nobody" })).await?;
    let kind = set_error_type(&resp, "notUpdated", missing)?;
    ensure_eq(&kind, &"notFound", None)?;
    Ok(())
});
