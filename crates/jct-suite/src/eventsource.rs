// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::skip::needs_event_source;
use crate::support::{create_email, destroy_emails, get_state, plain_email};
use jct_client::EventStream;
use jct_runtime::assertions::{ensure, ensure_contains, ensure_eq};
use jct_runtime::{Group, RunContext, TestDescriptor};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Checks in the `push-eventsource` category.
pub fn checks() -> Vec<TestDescriptor> {
    let es = Group::new("push-eventsource", "RFC8620", "7.3");
    vec![
        es.define("eventsource-connect", "The event source answers with text/event-stream", eventsource_connect)
            .skip_if(needs_event_source),
        es.define("eventsource-receives-state-change", "A change is pushed as a StateChange event", eventsource_receives_state_change)
            .skip_if(needs_event_source),
        es.define("eventsource-types-filter", "types limits the pushed data types", eventsource_types_filter)
            .skip_if(needs_event_source),
        es.define("eventsource-closeafter", "closeafter=state ends the response after one state event", eventsource_closeafter)
            .skip_if(needs_event_source),
    ]
}

/// Types in a StateChange's entry for `account_id`.
fn changed_types<'a>(change: &'a Value, account_id: &str) -> Vec<&'a str> {
    change["changed"][account_id]
        .as_object()
        .map(|types| types.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Next `state` event whose payload satisfies `wanted`.
async fn wait_for_state<F>(es: &mut EventStream, wanted: F) -> Option<Value>
where
    F: Fn(&Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        let frame = es.next_named("state", left).await?;
        match frame.payload() {
            Some(change) if wanted(&change) => return Some(change),
            other => debug!(?other, "skipping state event"),
        }
    }
}

/// Create and destroy a throwaway email so every mail type moves.
async fn touch_email(ctx: &RunContext, subject: &str) -> anyhow::Result<()> {
    let inbox = ctx.role("inbox")?.to_string();
    let id = create_email(ctx, plain_email(&inbox, subject, "Trigger a state change.")).await?;
    destroy_emails(ctx, &[&id]).await
}

body!(eventsource_connect, |ctx| {
    let es = ctx.client.event_source("*", "no", 0).await?;
    ensure_eq(&es.status(), &200, None)?;
    ensure_contains(&es.content_type().to_ascii_lowercase(), "text/event-stream", None)?;
    Ok(())
});

body!(eventsource_receives_state_change, |ctx| {
    let mut es = ctx.client.event_source("*", "no", 0).await?;
    ensure_eq(&es.status(), &200, None)?;
    let before = get_state(ctx, "Email").await?;
    touch_email(ctx, "EventSource state change").await?;
    let account_id = ctx.account_id.clone();
    let change = wait_for_state(&mut es, |change| {
        change["changed"][account_id.as_str()]["Email"]
            .as_str()
            .is_some_and(|state| state != before)
    })
    .await
    .ok_or_else(|| anyhow::anyhow!("no StateChange for Email within {EVENT_TIMEOUT:?}"))?;
    ensure_eq(&change["@type"], &Value::from("StateChange"), None)?;
    Ok(())
});

body!(eventsource_types_filter, |ctx| {
    let mut es = ctx.client.event_source("Email", "no", 0).await?;
    ensure_eq(&es.status(), &200, None)?;
    let before = get_state(ctx, "Email").await?;
    touch_email(ctx, "EventSource types filter").await?;
    let account_id = ctx.account_id.clone();
    let change = wait_for_state(&mut es, |change| {
        change["changed"][account_id.as_str()]["Email"]
            .as_str()
            .is_some_and(|state| state != before)
    })
    .await
    .ok_or_else(|| anyhow::anyhow!("no StateChange for Email within {EVENT_TIMEOUT:?}"))?;
    let types = changed_types(&change, &ctx.account_id);
    ensure(
        types.iter().all(|t| *t == "Email"),
        format!("only Email was subscribed, got {types:?}"),
    )?;
    Ok(())
});

body!(eventsource_closeafter, |ctx| {
    let mut es = ctx.client.event_source("*", "state", 0).await?;
    ensure_eq(&es.status(), &200, None)?;
    if es.next_named("state", CONNECT_TIMEOUT).await.is_none() && !es.is_finished() {
        touch_email(ctx, "EventSource closeafter").await?;
        es.next_named("state", EVENT_TIMEOUT)
            .await
            .ok_or_else(|| anyhow::anyhow!("no state event within {EVENT_TIMEOUT:?}"))?;
    }
    let trailing = es.next_frame(CONNECT_TIMEOUT).await;
    ensure(
        trailing.is_none() && es.is_finished(),
        "the response must end after the first state event",
    )?;
    Ok(())
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changed_types_reads_one_account() {
        let change = json!({
            "@type": "StateChange",
            "changed": { "A1": { "Email": "s2", "Mailbox": "s2" }, "A2": { "Thread": "s9" } },
        });
        let mut types = changed_types(&change, "A1");
        types.sort_unstable();
        assert_eq!(types, vec!["Email", "Mailbox"]);
        assert!(changed_types(&change, "A3").is_empty());
    }
}
