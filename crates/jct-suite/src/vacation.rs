// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::needs_vacation;
use crate::support::{first, set_error_type};
use jct_runtime::assertions::{
    array, ensure_contains, ensure_eq, ensure_has_property, ensure_len, ensure_type, string,
};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Value, json};

const SINGLETON: &str = "singleton";

/// Checks in the `vacation` category.
pub fn checks() -> Vec<TestDescriptor> {
    let vacation = Group::new("vacation", "RFC8621", "8");
    let set = Group::new("vacation", "RFC8621", "8.2");
    vec![
        vacation.define("get-singleton", "VacationResponse/get returns the singleton", get_singleton)
            .skip_if(needs_vacation),
        vacation.define("get-null-ids", "Null ids return exactly one object", get_null_ids)
            .section("8.1")
            .skip_if(needs_vacation),
        vacation.define("get-properties", "The singleton carries every property", get_properties)
            .skip_if(needs_vacation),
        set.define("set-enable-vacation", "VacationResponse/set enables the response", set_enable_vacation)
            .skip_if(needs_vacation),
        set.define("set-disable-vacation", "VacationResponse/set disables the response", set_disable_vacation)
            .skip_if(needs_vacation),
        set.define("set-dates", "fromDate and toDate are stored", set_dates)
            .skip_if(needs_vacation),
        set.define("set-html-body", "htmlBody is stored", set_html_body)
            .skip_if(needs_vacation),
        set.define("set-cannot-create", "Creating another response fails with singleton", set_cannot_create)
            .skip_if(needs_vacation),
        set.define("set-cannot-destroy", "Destroying the response fails with singleton", set_cannot_destroy)
            .skip_if(needs_vacation),
    ]
}

async fn fetch(ctx: &RunContext) -> anyhow::Result<Value> {
    let resp = ctx.call("VacationResponse/get", json!({ "ids": null })).await?;
    Ok(first(&resp, "VacationResponse/get")?.clone())
}

async fn update(ctx: &RunContext, patch: Value) -> anyhow::Result<Value> {
    Ok(ctx
        .call("VacationResponse/set", json!({ "update": { "singleton": patch } }))
        .await?)
}

/// Put the response back to disabled with no dates or bodies.
async fn reset(ctx: &RunContext) -> anyhow::Result<()> {
    update(
        ctx,
        json!({
            "isEnabled": false,
            "fromDate": null,
            "toDate": null,
            "subject": null,
            "textBody": null,
            "htmlBody": null,
        }),
    )
    .await?;
    Ok(())
}

body!(get_singleton, |ctx| {
    let resp = ctx
        .call("VacationResponse/get", json!({ "ids": [SINGLETON] }))
        .await?;
    ensure_eq(&first(&resp, "VacationResponse/get")?["id"], &json!(SINGLETON), None)?;
    Ok(())
});

body!(get_null_ids, |ctx| {
    let resp = ctx.call("VacationResponse/get", json!({ "ids": null })).await?;
    ensure_len(array(&resp["list"], "list")?, 1, None)?;
    Ok(())
});

body!(get_properties, |ctx| {
    let vacation = fetch(ctx).await?;
    ensure_type(&vacation["isEnabled"], "boolean", None)?;
    for key in ["fromDate", "toDate", "subject", "textBody", "htmlBody"] {
        ensure_has_property(&vacation, key, None)?;
    }
    Ok(())
});

body!(set_enable_vacation, |ctx| {
    let resp = update(
        ctx,
        json!({
            "isEnabled": true,
            "subject": "Out of Office - Conformance",
            "textBody": "I am currently out of the office.",
        }),
    )
    .await?;
    let vacation = fetch(ctx).await;
    reset(ctx).await?;
    ensure_has_property(&resp["updated"], SINGLETON, None)?;
    let vacation = vacation?;
    ensure_eq(&vacation["isEnabled"], &json!(true), None)?;
    ensure_eq(&vacation["subject"], &json!("Out of Office - Conformance"), None)?;
    Ok(())
});

body!(set_disable_vacation, |ctx| {
    update(ctx, json!({ "isEnabled": true })).await?;
    let resp = update(ctx, json!({ "isEnabled": false })).await?;
    let vacation = fetch(ctx).await;
    reset(ctx).await?;
    ensure_has_property(&resp["updated"], SINGLETON, None)?;
    ensure_eq(&vacation?["isEnabled"], &json!(false), None)?;
    Ok(())
});

body!(set_dates, |ctx| {
    let from = "2026-03-01T00:00:00Z";
    let to = "2026-03-15T00:00:00Z";
    update(ctx, json!({ "fromDate": from, "toDate": to })).await?;
    let vacation = fetch(ctx).await;
    reset(ctx).await?;
    let vacation = vacation?;
    ensure_eq(&vacation["fromDate"], &json!(from), None)?;
    ensure_eq(&vacation["toDate"], &json!(to), None)?;
    Ok(())
});

body!(set_html_body, |ctx| {
    let html = "<html><body><p>I am out of office until next week.</p></body></html>";
    update(ctx, json!({ "htmlBody": html })).await?;
    let vacation = fetch(ctx).await;
    reset(ctx).await?;
    let vacation = vacation?;
    ensure_contains(string(&vacation["htmlBody"], "htmlBody")?, "out of office", None)?;
    Ok(())
});

body!(set_cannot_create, |ctx| {
    let resp = ctx
        .call(
            "VacationResponse/set",
            json!({ "create": { "newVr": { "isEnabled": true, "subject": "Second response" } } }),
        )
        .await?;
    let kind = set_error_type(&resp, "notCreated", "newVr")?;
    ensure_eq(&kind, &"singleton", None)?;
    Ok(())
});

body!(set_cannot_destroy, |ctx| {
    let resp = ctx
        .call("VacationResponse/set", json!({ "destroy": [SINGLETON] }))
        .await?;
    let kind = set_error_type(&resp, "notDestroyed", SINGLETON)?;
    ensure_eq(&kind, &"singleton", None)?;
    Ok(())
});
