// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clean, seed and teardown against the in-memory account.

use jct_client::JmapApi;
use jct_config::{AccountCredentials, HarnessConfig};
use jct_mock::MockAccount;
use jct_runtime::lifecycle::{self, LifecycleError};
use jct_runtime::{MailboxNode, RunContext, destroy_order};
use proptest::prelude::*;
use std::sync::Arc;

fn context(mock: &Arc<MockAccount>) -> RunContext {
    RunContext::new(mock.clone(), HarnessConfig::default())
}

fn with_secondary_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.accounts.primary.username = "alice@example.com".into();
    config.accounts.secondary = Some(AccountCredentials {
        username: "bob@example.com".into(),
        password: "pw".into(),
    });
    config
}

// ── clean ───────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_account_passes_and_records_roles() {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    for role in ["inbox", "drafts", "sent", "trash"] {
        assert!(ctx.role(role).is_ok(), "missing role {role}");
    }
}

#[tokio::test]
async fn dirty_account_without_force_is_refused() {
    let mock = Arc::new(
        MockAccount::new()
            .with_custom_mailbox("Leftover", None)
            .with_emails(3),
    );
    let mut ctx = context(&mock);
    let err = lifecycle::clean(&mut ctx, false).await.unwrap_err();
    match &err {
        LifecycleError::AccountNotEmpty { emails, mailboxes } => {
            assert_eq!(*emails, 3);
            assert_eq!(*mailboxes, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.to_string().contains("Use -f to force-delete"));
    assert_eq!(mock.email_count(), 3);
    assert_eq!(mock.custom_mailboxes(), vec!["Leftover"]);
}

#[tokio::test]
async fn force_clean_empties_nested_mailboxes_and_paginates() {
    let mock = Arc::new(
        MockAccount::new()
            .with_custom_mailbox("Top", None)
            .with_custom_mailbox("Middle", Some("Top"))
            .with_custom_mailbox("Leaf", Some("Middle"))
            .with_custom_mailbox("Other", None)
            .with_emails(120),
    );
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, true).await.unwrap();
    assert_eq!(mock.email_count(), 0);
    assert!(mock.custom_mailboxes().is_empty());

    let destroys = mock
        .method_log()
        .iter()
        .filter(|m| m.as_str() == "Email/set")
        .count();
    assert_eq!(destroys, 3);
}

#[tokio::test]
async fn force_clean_tolerates_undeletable_mailbox() {
    let mock = Arc::new(
        MockAccount::new()
            .with_custom_mailbox("Stuck", None)
            .with_custom_mailbox("Gone", None)
            .with_undeletable_mailbox("Stuck"),
    );
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, true).await.unwrap();
    assert_eq!(mock.custom_mailboxes(), vec!["Stuck"]);
}

#[tokio::test]
async fn failing_query_is_fatal() {
    let mock = Arc::new(MockAccount::new().with_failing_method("Email/query", "serverFail"));
    let mut ctx = context(&mock);
    let err = lifecycle::clean(&mut ctx, true).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Client(_)));
}

// ── seed ────────────────────────────────────────────────────────────

#[tokio::test]
async fn seed_creates_fixture_set() {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();

    assert_eq!(
        mock.custom_mailboxes(),
        vec!["Child 1", "Child 2", "Test Folder A", "Test Folder B"]
    );
    assert_eq!(ctx.mailbox_ids.len(), 4);
    assert!(ctx.blob("pdf").is_ok());
    assert!(ctx.blob("jpeg").is_ok());
    // No secondary account: the submission draft is left out.
    assert_eq!(ctx.email_ids.len(), 21);
    assert!(ctx.email("draft-for-submission").is_err());
    assert_eq!(mock.email_count(), 21);
    assert!(ctx.client.state("Email").is_some());
    assert!(ctx.client.state("Mailbox").is_some());
}

#[tokio::test]
async fn seed_imports_in_batches() {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();
    let imports = mock
        .method_log()
        .iter()
        .filter(|m| m.as_str() == "Email/import")
        .count();
    assert_eq!(imports, 21usize.div_ceil(lifecycle::IMPORT_BATCH));
}

#[tokio::test]
async fn seed_with_secondary_includes_draft() {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = RunContext::new(mock.clone(), with_secondary_config());
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();
    assert_eq!(ctx.email_ids.len(), 22);
    assert!(ctx.email("draft-for-submission").is_ok());
}

#[tokio::test]
async fn rejected_import_is_logged_not_fatal() {
    let mock = Arc::new(MockAccount::new().with_rejected_import("Malformed email test"));
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();
    assert!(ctx.email("invalid-ascii").is_err());
    assert!(ctx.email("korean-euckr").is_ok());
    assert_eq!(ctx.email_ids.len(), 20);
}

#[tokio::test]
async fn missing_inbox_is_fatal() {
    let mock = Arc::new(MockAccount::new().without_role("inbox"));
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    let err = lifecycle::seed(&mut ctx).await.unwrap_err();
    assert!(matches!(err, LifecycleError::MissingInbox));
    assert!(mock.custom_mailboxes().is_empty());
}

#[tokio::test]
async fn identities_discovered_with_submission() {
    let primary = Arc::new(MockAccount::new().with_submission());
    let secondary = Arc::new(MockAccount::named("bob", "B1").with_submission());
    let mut ctx = RunContext::new(primary.clone(), HarnessConfig::default())
        .with_secondary(secondary);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();
    assert_eq!(ctx.identity_ids.len(), 1);
    assert_eq!(ctx.identity_email.as_deref(), Some("alice@example.com"));
    assert_eq!(ctx.secondary_email.as_deref(), Some("bob@example.com"));
}

#[tokio::test]
async fn identities_skipped_without_submission() {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();
    assert!(ctx.identity_ids.is_empty());
    assert!(!mock.method_log().iter().any(|m| m == "Identity/get"));
}

// ── teardown ────────────────────────────────────────────────────────

#[tokio::test]
async fn teardown_removes_fixtures_and_is_idempotent() {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = context(&mock);
    lifecycle::clean(&mut ctx, false).await.unwrap();
    lifecycle::seed(&mut ctx).await.unwrap();

    lifecycle::teardown(&ctx).await;
    assert_eq!(mock.email_count(), 0);
    assert!(mock.custom_mailboxes().is_empty());

    lifecycle::teardown(&ctx).await;
    assert_eq!(mock.email_count(), 0);

    // A clean run after teardown finds nothing to refuse.
    let mut again = context(&mock);
    lifecycle::clean(&mut again, false).await.unwrap();
}

// ── destroy order ───────────────────────────────────────────────────

fn forest() -> impl Strategy<Value = Vec<MailboxNode>> {
    (1usize..24).prop_flat_map(|n| {
        proptest::collection::vec(proptest::option::of(0usize..n), n).prop_map(|parents| {
            parents
                .into_iter()
                .enumerate()
                .map(|(i, p)| MailboxNode {
                    id: format!("m{i}"),
                    name: format!("Mailbox {i}"),
                    // Only earlier nodes may be parents, so the input is acyclic.
                    parent_id: p.filter(|&p| p < i).map(|p| format!("m{p}")),
                    role: None,
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn every_child_precedes_its_parent(nodes in forest()) {
        let order = destroy_order(&nodes);
        prop_assert_eq!(order.len(), nodes.len());
        let pos = |id: &str| order.iter().position(|x| x == id);
        for node in &nodes {
            if let Some(parent) = &node.parent_id {
                prop_assert!(pos(&node.id) < pos(parent));
            }
        }
    }
}
