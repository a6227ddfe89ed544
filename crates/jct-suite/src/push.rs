// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::needs_relay;
use crate::support::{created_id, first, strings};
use jct_relay::RelayChannel;
use jct_runtime::assertions::{ensure, ensure_contains, ensure_eq, ensure_includes};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Checks in the `push-subscription` category.
pub fn checks() -> Vec<TestDescriptor> {
    let push = Group::new("push-subscription", "RFC8620", "7.2");
    vec![
        push.define("create", "PushSubscription/set creates a subscription", create)
            .skip_if(needs_relay),
        push.define("get", "PushSubscription/get returns a created subscription", get)
            .skip_if(needs_relay),
        push.define("destroy", "PushSubscription/set destroy removes the subscription", destroy)
            .skip_if(needs_relay),
        push.define("receives-notification", "A change is pushed as a StateChange", receives_notification)
            .section("7.1")
            .skip_if(needs_relay),
    ]
}

fn relay(ctx: &RunContext) -> anyhow::Result<&RelayChannel> {
    ctx.relay
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no relay channel"))
}

/// Subscribe the relay channel and return the subscription id.
async fn subscribe(ctx: &RunContext, device: &str, types: Value) -> anyhow::Result<String> {
    let url = relay(ctx)?.url().to_string();
    let resp = ctx
        .client
        .call(
            "PushSubscription/set",
            json!({ "create": { "ps": { "deviceClientId": device, "url": url, "types": types } } }),
        )
        .await?;
    Ok(created_id(&resp, "ps")?)
}

async fn unsubscribe(ctx: &RunContext, id: &str) -> anyhow::Result<Value> {
    Ok(ctx
        .client
        .call("PushSubscription/set", json!({ "destroy": [id] }))
        .await?)
}

fn event_type(event: &Value) -> Option<&str> {
    event["@type"].as_str()
}

body!(create, |ctx| {
    let id = subscribe(ctx, "jmap-conformance-create", Value::Null).await?;
    unsubscribe(ctx, &id).await?;
    ensure(!id.is_empty(), "subscription id must not be empty")?;
    Ok(())
});

body!(get, |ctx| {
    let id = subscribe(ctx, "jmap-conformance-get", json!(["Email"])).await?;
    let resp = ctx
        .client
        .call("PushSubscription/get", json!({ "ids": [id] }))
        .await;
    unsubscribe(ctx, &id).await?;
    let resp = resp?;
    let subscription = first(&resp, "PushSubscription/get")?;
    ensure_eq(&subscription["id"], &json!(id), None)?;
    ensure_eq(
        &subscription["deviceClientId"],
        &json!("jmap-conformance-get"),
        None,
    )?;
    ensure_contains(
        subscription["url"].as_str().unwrap_or_default(),
        relay(ctx)?.url(),
        None,
    )?;
    Ok(())
});

body!(destroy, |ctx| {
    let id = subscribe(ctx, "jmap-conformance-destroy", Value::Null).await?;
    let resp = unsubscribe(ctx, &id).await?;
    ensure_includes(&strings(&resp["destroyed"]), &id, None)?;
    let after = ctx
        .client
        .call("PushSubscription/get", json!({ "ids": [id] }))
        .await?;
    ensure_includes(&strings(&after["notFound"]), &id, None)?;
    Ok(())
});

body!(receives_notification, |ctx| {
    relay(ctx)?.clear();
    let id = subscribe(ctx, "jmap-conformance-notify", Value::Null).await?;

    let verification = relay(ctx)?
        .wait_for_match(|e| event_type(e) == Some("PushVerification"), VERIFY_TIMEOUT)
        .await;
    match verification {
        Some(event) => {
            let code = event["verificationCode"].clone();
            let mut update = Map::new();
            update.insert(id.clone(), json!({ "verificationCode": code }));
            ctx.client
                .call("PushSubscription/set", json!({ "update": update }))
                .await?;
        }
        None => debug!(target: "jct.runner", "no PushVerification arrived, continuing"),
    }

    let email = ctx.email("plain-simple")?.to_string();
    let mut patch = Map::new();
    patch.insert(email.clone(), json!({ "keywords/$flagged": true }));
    ctx.call("Email/set", json!({ "update": patch })).await?;

    let change = relay(ctx)?
        .wait_for_match(|e| event_type(e) == Some("StateChange"), NOTIFY_TIMEOUT)
        .await;

    let mut revert = Map::new();
    revert.insert(email, json!({ "keywords/$flagged": null }));
    ctx.call("Email/set", json!({ "update": revert })).await?;
    unsubscribe(ctx, &id).await?;

    let change = change.ok_or_else(|| {
        anyhow::anyhow!("no StateChange within {}s", NOTIFY_TIMEOUT.as_secs())
    })?;
    ensure(
        change["changed"].is_object(),
        "StateChange must carry a changed map",
    )?;
    Ok(())
});
