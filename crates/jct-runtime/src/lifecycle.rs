// SPDX-License-Identifier: MIT OR Apache-2.0
//! Account lifecycle: bring the account to an empty baseline, seed the
//! fixture set, and remove it again afterwards.

use crate::context::RunContext;
use crate::fixtures::{self, DraftParties, FixtureMessage, Targets};
use chrono::{SecondsFormat, Utc};
use jct_client::ClientError;
use jct_core::CAP_SUBMISSION;
use jct_error::ErrorCode;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// Emails queried and destroyed per round trip.
pub const PAGE_SIZE: usize = 50;

/// Emails imported per `Email/import` call.
pub const IMPORT_BATCH: usize = 5;

/// Content type used when uploading fixture messages.
const MESSAGE_TYPE: &str = "message/rfc5322";

/// Errors raised by [`clean`] and [`seed`].
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The account holds data and force mode was not requested.
    #[error(
        "Account is not empty ({emails} emails, {mailboxes} custom mailboxes). Use -f to force-delete existing data."
    )]
    AccountNotEmpty {
        /// Total emails reported by the server.
        emails: u64,
        /// Role-less mailboxes found.
        mailboxes: usize,
    },

    /// `Email/set` destroyed nothing although emails remain.
    #[error("email cleanup made no progress with {remaining} emails left")]
    CleanStalled {
        /// Ids returned by the last query.
        remaining: usize,
    },

    /// The server refused to destroy a mailbox.
    #[error("mailbox {id} not destroyed: {reason}")]
    MailboxNotDestroyed {
        /// Mailbox id.
        id: String,
        /// SetError type reported by the server.
        reason: String,
    },

    /// The account has no inbox.
    #[error("No inbox found")]
    MissingInbox,

    /// A fixture the catalog depends on could not be created.
    #[error("seeding {step} failed: {reason}")]
    Seed {
        /// Which seeding step failed.
        step: &'static str,
        /// Server-provided detail.
        reason: String,
    },

    /// A protocol call failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl LifecycleError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AccountNotEmpty { .. } => ErrorCode::PreconditionAccountNotEmpty,
            Self::CleanStalled { .. } | Self::MailboxNotDestroyed { .. } => {
                ErrorCode::PreconditionCleanFailed
            }
            Self::MissingInbox | Self::Seed { .. } => ErrorCode::FixtureSeedFailed,
            Self::Client(e) => e.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Destroy ordering
// ---------------------------------------------------------------------------

/// A mailbox as seen by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxNode {
    /// Server id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent id, `None` for top-level mailboxes.
    pub parent_id: Option<String>,
    /// Role, `None` for custom mailboxes.
    pub role: Option<String>,
}

impl MailboxNode {
    fn from_json(v: &Value) -> Option<Self> {
        Some(Self {
            id: v.get("id")?.as_str()?.to_string(),
            name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            parent_id: v.get("parentId").and_then(Value::as_str).map(str::to_string),
            role: v.get("role").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Ids of `nodes` ordered so every child precedes its parent.
///
/// Repeatedly peels off the nodes no remaining node points to as parent.
/// If a round finds none (a cycle), the remainder is appended as-is.
pub fn destroy_order(nodes: &[MailboxNode]) -> Vec<String> {
    let mut remaining: Vec<&MailboxNode> = nodes.iter().collect();
    let mut order = Vec::with_capacity(nodes.len());
    while !remaining.is_empty() {
        let (leaves, rest): (Vec<&MailboxNode>, Vec<&MailboxNode>) =
            remaining.iter().partition(|n| {
                !remaining
                    .iter()
                    .any(|other| other.parent_id.as_deref() == Some(n.id.as_str()))
            });
        if leaves.is_empty() {
            order.extend(rest.iter().map(|n| n.id.clone()));
            break;
        }
        order.extend(leaves.iter().map(|n| n.id.clone()));
        remaining = rest;
    }
    order
}

// ---------------------------------------------------------------------------
// Clean
// ---------------------------------------------------------------------------

async fn call(ctx: &RunContext, method: &str, args: Value) -> Result<Value, ClientError> {
    ctx.client.call(method, args).await
}

fn remember_state(ctx: &RunContext, type_name: &str, response: &Value) {
    if let Some(state) = response.get("newState").and_then(Value::as_str) {
        ctx.client.update_state(type_name, state);
    }
}

/// Ensure the account is empty.
///
/// Records role mailboxes into the context. When role-less mailboxes or
/// emails exist, fails with [`LifecycleError::AccountNotEmpty`] unless
/// `force` is set, in which case everything is destroyed.
pub async fn clean(ctx: &mut RunContext, force: bool) -> Result<(), LifecycleError> {
    let mailboxes = call(ctx, "Mailbox/get", json!({ "accountId": ctx.account_id, "ids": null })).await?;
    let nodes: Vec<MailboxNode> = mailboxes["list"]
        .as_array()
        .map(|list| list.iter().filter_map(MailboxNode::from_json).collect())
        .unwrap_or_default();
    for node in &nodes {
        if let Some(role) = &node.role {
            ctx.role_mailboxes.insert(role.clone(), node.id.clone());
        }
    }
    let custom: Vec<MailboxNode> = nodes.into_iter().filter(|n| n.role.is_none()).collect();

    let query = call(
        ctx,
        "Email/query",
        json!({ "accountId": ctx.account_id, "limit": 1, "calculateTotal": true }),
    )
    .await?;
    let emails = query["total"].as_u64().unwrap_or(0);

    if custom.is_empty() && emails == 0 {
        info!(target: "jct.lifecycle", "Account is clean.");
        return Ok(());
    }
    if !force {
        return Err(LifecycleError::AccountNotEmpty {
            emails,
            mailboxes: custom.len(),
        });
    }

    info!(target: "jct.lifecycle", "Force-cleaning: {emails} emails, {} custom mailboxes", custom.len());
    destroy_all_emails(ctx).await?;

    let names: std::collections::BTreeMap<&str, &str> =
        custom.iter().map(|n| (n.id.as_str(), n.name.as_str())).collect();
    for id in destroy_order(&custom) {
        let name = names.get(id.as_str()).copied().unwrap_or_default();
        match destroy_mailbox(ctx, &id).await {
            Ok(()) => info!(target: "jct.lifecycle", "Deleted mailbox: {name}"),
            Err(err) => {
                warn!(target: "jct.lifecycle", mailbox = %name, error = %err, "could not delete mailbox");
            }
        }
    }
    Ok(())
}

/// Query-and-destroy emails a page at a time until a short page.
async fn destroy_all_emails(ctx: &RunContext) -> Result<usize, LifecycleError> {
    let mut total = 0;
    loop {
        let query = call(
            ctx,
            "Email/query",
            json!({ "accountId": ctx.account_id, "limit": PAGE_SIZE }),
        )
        .await?;
        let ids: Vec<Value> = query["ids"].as_array().cloned().unwrap_or_default();
        if ids.is_empty() {
            break;
        }
        let result = call(
            ctx,
            "Email/set",
            json!({ "accountId": ctx.account_id, "destroy": ids }),
        )
        .await?;
        remember_state(ctx, "Email", &result);
        let destroyed = result["destroyed"].as_array().map_or(0, Vec::len);
        if destroyed == 0 {
            return Err(LifecycleError::CleanStalled {
                remaining: ids.len(),
            });
        }
        total += destroyed;
        debug!(target: "jct.lifecycle", "Deleted {destroyed} emails...");
        if ids.len() < PAGE_SIZE {
            break;
        }
    }
    Ok(total)
}

async fn destroy_mailbox(ctx: &RunContext, id: &str) -> Result<(), LifecycleError> {
    let result = call(
        ctx,
        "Mailbox/set",
        json!({ "accountId": ctx.account_id, "destroy": [id], "onDestroyRemoveEmails": true }),
    )
    .await?;
    remember_state(ctx, "Mailbox", &result);
    match result["notDestroyed"].get(id) {
        Some(err) => Err(LifecycleError::MailboxNotDestroyed {
            id: id.to_string(),
            reason: err["type"].as_str().unwrap_or("unknown").to_string(),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Create the deterministic fixture set and record every id in the context.
pub async fn seed(ctx: &mut RunContext) -> Result<(), LifecycleError> {
    let inbox = ctx.role_mailboxes.get("inbox").cloned().ok_or(LifecycleError::MissingInbox)?;
    create_mailboxes(ctx).await?;
    upload_blobs(ctx).await?;
    create_emails(ctx, inbox).await?;
    discover_identities(ctx).await;
    info!(
        target: "jct.lifecycle",
        "Seeded: {} mailboxes, {} emails",
        ctx.mailbox_ids.len(),
        ctx.email_ids.len()
    );
    Ok(())
}

async fn create_pair(
    ctx: &mut RunContext,
    parent: Option<&str>,
    pair: [(&str, &str); 2],
) -> Result<(), LifecycleError> {
    let mut create = Map::new();
    for (key, name) in pair {
        create.insert(key.into(), json!({ "name": name, "parentId": parent }));
    }
    let result = call(ctx, "Mailbox/set", json!({ "accountId": ctx.account_id, "create": create })).await?;
    for (key, name) in pair {
        let Some(id) = result["created"][key]["id"].as_str() else {
            let reason = result["notCreated"][key]["type"].as_str().unwrap_or("not created");
            return Err(LifecycleError::Seed {
                step: "mailboxes",
                reason: format!("{name}: {reason}"),
            });
        };
        info!(target: "jct.lifecycle", "Created: {name} ({id})");
        ctx.mailbox_ids.insert(key.to_string(), id.to_string());
    }
    remember_state(ctx, "Mailbox", &result);
    Ok(())
}

async fn create_mailboxes(ctx: &mut RunContext) -> Result<(), LifecycleError> {
    create_pair(ctx, None, [("folderA", "Test Folder A"), ("folderB", "Test Folder B")]).await?;
    let folder_a = ctx.mailbox_ids.get("folderA").cloned();
    create_pair(ctx, folder_a.as_deref(), [("child1", "Child 1"), ("child2", "Child 2")]).await
}

async fn upload_blobs(ctx: &mut RunContext) -> Result<(), LifecycleError> {
    for (key, data, content_type) in [
        ("pdf", fixtures::pdf_blob(), "application/pdf"),
        ("jpeg", fixtures::jpeg_blob(), "image/jpeg"),
    ] {
        let uploaded = ctx.client.upload(data, content_type, None).await?;
        ctx.blob_ids.insert(key.to_string(), uploaded.blob_id);
    }
    info!(target: "jct.lifecycle", "Uploaded {} blobs", ctx.blob_ids.len());
    Ok(())
}

fn mailbox(ctx: &RunContext, key: &'static str) -> Result<String, LifecycleError> {
    ctx.mailbox_ids.get(key).cloned().ok_or(LifecycleError::Seed {
        step: "emails",
        reason: format!("fixture mailbox {key} missing"),
    })
}

async fn create_emails(ctx: &mut RunContext, inbox: String) -> Result<(), LifecycleError> {
    let targets = Targets {
        drafts: ctx.role_mailboxes.get("drafts").cloned().unwrap_or_else(|| inbox.clone()),
        inbox,
        folder_a: mailbox(ctx, "folderA")?,
        folder_b: mailbox(ctx, "folderB")?,
        child1: mailbox(ctx, "child1")?,
    };
    let draft = ctx.config.accounts.secondary.as_ref().map(|secondary| DraftParties {
        from: ctx.config.accounts.primary.username.clone(),
        to: secondary.username.clone(),
    });
    let messages = fixtures::fixture_messages(Utc::now(), &targets, draft.as_ref());
    for batch in messages.chunks(IMPORT_BATCH) {
        import_batch(ctx, batch).await?;
    }
    Ok(())
}

async fn import_batch(ctx: &mut RunContext, batch: &[FixtureMessage]) -> Result<(), LifecycleError> {
    let mut emails = Map::new();
    for message in batch {
        let uploaded = ctx.client.upload(message.raw.clone(), MESSAGE_TYPE, None).await?;
        let mailbox_ids: Map<String, Value> = message
            .mailbox_ids
            .iter()
            .map(|id| (id.clone(), Value::Bool(true)))
            .collect();
        let keywords: Map<String, Value> = message
            .keywords
            .iter()
            .map(|k| (k.to_string(), Value::Bool(true)))
            .collect();
        emails.insert(
            message.key.to_string(),
            json!({
                "blobId": uploaded.blob_id,
                "mailboxIds": mailbox_ids,
                "keywords": keywords,
                "receivedAt": message.received_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
        );
    }
    let result = call(ctx, "Email/import", json!({ "accountId": ctx.account_id, "emails": emails })).await?;
    let mut imported = 0;
    for message in batch {
        if let Some(id) = result["created"][message.key]["id"].as_str() {
            ctx.email_ids.insert(message.key.to_string(), id.to_string());
            imported += 1;
        } else if let Some(err) = result["notCreated"].get(message.key) {
            warn!(
                target: "jct.lifecycle",
                "Failed to import '{}': {} - {}",
                message.key,
                err["type"].as_str().unwrap_or("unknown"),
                err["description"].as_str().unwrap_or("no details")
            );
        }
    }
    remember_state(ctx, "Email", &result);
    info!(target: "jct.lifecycle", "Imported {imported}/{} emails", batch.len());
    Ok(())
}

async fn first_identity(client: &dyn jct_client::JmapApi) -> Result<(Vec<String>, Option<String>), ClientError> {
    let result = client
        .call("Identity/get", json!({ "accountId": client.account_id(), "ids": null }))
        .await?;
    let list = result["list"].as_array().cloned().unwrap_or_default();
    let ids = list
        .iter()
        .filter_map(|i| i["id"].as_str().map(str::to_string))
        .collect();
    let email = list.first().and_then(|i| i["email"].as_str()).map(str::to_string);
    Ok((ids, email))
}

async fn discover_identities(ctx: &mut RunContext) {
    if !ctx.has_capability(CAP_SUBMISSION) {
        return;
    }
    match first_identity(ctx.client.as_ref()).await {
        Ok((ids, email)) => {
            info!(target: "jct.lifecycle", "Discovered {} identities", ids.len());
            ctx.identity_ids = ids;
            ctx.identity_email = email;
        }
        Err(err) => {
            warn!(target: "jct.lifecycle", error = %err, "Could not fetch identities");
            return;
        }
    }
    if let Some(secondary) = ctx.secondary.clone() {
        match first_identity(secondary.as_ref()).await {
            Ok((_, email)) => ctx.secondary_email = email,
            Err(err) => debug!(target: "jct.lifecycle", error = %err, "secondary identity lookup failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Remove every email and the fixture mailboxes. Never fails; safe to call
/// repeatedly.
pub async fn teardown(ctx: &RunContext) {
    match destroy_all_emails(ctx).await {
        Ok(0) => {}
        Ok(n) => info!(target: "jct.lifecycle", "Destroyed {n} emails"),
        Err(err) => warn!(target: "jct.lifecycle", error = %err, "email teardown incomplete"),
    }
    let mut destroyed = 0;
    for key in ["child1", "child2", "folderA", "folderB"] {
        let Some(id) = ctx.mailbox_ids.get(key) else {
            continue;
        };
        match destroy_mailbox(ctx, id).await {
            Ok(()) => destroyed += 1,
            Err(err) => debug!(target: "jct.lifecycle", mailbox = key, error = %err, "mailbox teardown skipped"),
        }
    }
    if destroyed > 0 {
        info!(target: "jct.lifecycle", "Destroyed {destroyed} mailboxes");
    }
    info!(target: "jct.lifecycle", "Teardown complete.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, parent: Option<&str>) -> MailboxNode {
        MailboxNode {
            id: id.into(),
            name: id.into(),
            parent_id: parent.map(str::to_string),
            role: None,
        }
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn children_precede_parents() {
        let nodes = vec![
            node("root", None),
            node("a", Some("root")),
            node("b", Some("a")),
            node("c", Some("root")),
        ];
        let order = destroy_order(&nodes);
        assert_eq!(order.len(), 4);
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "a") < position(&order, "root"));
        assert!(position(&order, "c") < position(&order, "root"));
    }

    #[test]
    fn cycles_are_appended_as_is() {
        let nodes = vec![node("x", Some("y")), node("y", Some("x")), node("z", None)];
        let order = destroy_order(&nodes);
        assert_eq!(order, vec!["z", "x", "y"]);
    }

    #[test]
    fn parents_outside_the_set_do_not_block() {
        let nodes = vec![node("a", Some("role-inbox"))];
        assert_eq!(destroy_order(&nodes), vec!["a"]);
    }

    #[test]
    fn precondition_message_names_counts() {
        let err = LifecycleError::AccountNotEmpty {
            emails: 3,
            mailboxes: 2,
        };
        assert_eq!(
            err.to_string(),
            "Account is not empty (3 emails, 2 custom mailboxes). Use -f to force-delete existing data."
        );
        assert_eq!(err.code(), ErrorCode::PreconditionAccountNotEmpty);
    }
}
