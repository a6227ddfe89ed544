// SPDX-License-Identifier: MIT OR Apache-2.0
//! The full catalog run against the in-memory account.

use jct_config::{AccountCredentials, HarnessConfig};
use jct_core::{TestResult, TestStatus};
use jct_mock::MockAccount;
use jct_runtime::{RunContext, RunOptions, Runner};
use std::sync::Arc;

/// Default configuration with the push relay disabled, so runs stay offline.
fn offline() -> HarnessConfig {
    HarnessConfig {
        relay_url: None,
        ..HarnessConfig::default()
    }
}

/// Offline configuration naming a secondary login, so `submission` is selected.
fn with_secondary() -> HarnessConfig {
    let mut config = offline();
    config.accounts.secondary = Some(AccountCredentials {
        username: "bob@example.com".into(),
        password: "secret".into(),
    });
    config
}

async fn run_catalog(mock: MockAccount, filter: Option<&str>) -> (Arc<MockAccount>, Vec<TestResult>) {
    let mock = Arc::new(mock);
    let ctx = RunContext::new(mock.clone(), offline());
    (mock, run_with(ctx, filter).await)
}

async fn run_with(mut ctx: RunContext, filter: Option<&str>) -> Vec<TestResult> {
    let mut observer = |_: usize, _: usize, _: &TestResult| {};
    let options = RunOptions {
        filter: filter.map(str::to_string),
        ..RunOptions::default()
    };
    Runner::new(jct_suite::catalog(), options)
        .execute(&mut ctx, &mut observer)
        .await
        .unwrap()
}

fn failures(results: &[TestResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.status == TestStatus::Failed)
        .map(|r| format!("{}: {}", r.test_id, r.error.as_deref().unwrap_or("")))
        .collect()
}

fn status<'a>(results: &'a [TestResult], id: &str) -> &'a TestResult {
    results
        .iter()
        .find(|r| r.test_id == id)
        .unwrap_or_else(|| panic!("{id} did not run"))
}

// ── Whole catalog ───────────────────────────────────────────────────

#[tokio::test]
async fn conformant_account_fails_nothing() {
    let (_, results) = run_catalog(MockAccount::new(), None).await;
    assert!(!results.is_empty());
    let failed = failures(&results);
    assert!(failed.is_empty(), "unexpected failures:\n{}", failed.join("\n"));
}

#[tokio::test]
async fn one_result_per_selected_check() {
    let (_, results) = run_catalog(MockAccount::new(), None).await;
    let config = offline();
    let runner = Runner::new(jct_suite::catalog(), RunOptions::default());
    let expected: Vec<&str> = runner
        .selected(&config)
        .into_iter()
        .map(|t| t.id.as_str())
        .collect();
    let got: Vec<&str> = results.iter().map(|r| r.test_id.as_str()).collect();
    assert_eq!(got, expected);
    assert!(!got.iter().any(|id| id.starts_with("submission/")));
}

#[tokio::test]
async fn account_is_clean_after_the_run() {
    let (mock, _) = run_catalog(MockAccount::new(), None).await;
    assert_eq!(mock.email_count(), 0);
    assert!(mock.custom_mailboxes().is_empty());
}

// ── Capability gating ───────────────────────────────────────────────

#[tokio::test]
async fn missing_capabilities_skip_with_reasons() {
    let (_, results) = run_catalog(MockAccount::new(), Some("identity/*,vacation/*,push-subscription/*")).await;
    assert!(!results.is_empty());
    for r in &results {
        assert_eq!(r.status, TestStatus::Skipped, "{}", r.test_id);
        assert!(r.error.is_some(), "{} has no skip reason", r.test_id);
    }
    assert_eq!(
        status(&results, "vacation/get-singleton").error.as_deref(),
        Some("Server does not support vacationresponse")
    );
    assert_eq!(
        status(&results, "push-subscription/create").error.as_deref(),
        Some("No push relay channel available")
    );
}

#[tokio::test]
async fn advertised_capabilities_run_their_checks() {
    let mock = Arc::new(MockAccount::new().with_submission().with_vacation());
    let ctx = RunContext::new(mock, with_secondary());
    let results = run_with(ctx, Some("identity/*,submission/*,vacation/*")).await;
    assert!(results.len() >= 30);
    for r in &results {
        if r.status == TestStatus::Skipped {
            assert_eq!(r.error.as_deref(), Some("No secondary account configured"), "{}", r.test_id);
        } else {
            assert_eq!(r.status, TestStatus::Passed, "{}: {:?}", r.test_id, r.error);
        }
    }
    assert_eq!(status(&results, "submission/set-no-recipients-error").status, TestStatus::Passed);
    assert_eq!(status(&results, "vacation/set-cannot-create").status, TestStatus::Passed);
    assert_eq!(status(&results, "identity/set-update-name").status, TestStatus::Passed);
}

#[tokio::test]
async fn submissions_send_to_the_secondary_account() {
    let mock = Arc::new(MockAccount::new().with_submission());
    let bob = MockAccount::named("bob", "A2").with_submission();
    let ctx = RunContext::new(mock.clone(), with_secondary()).with_secondary(Arc::new(bob));
    let results = run_with(ctx, Some("submission/set-*")).await;
    assert_eq!(results.len(), 5);
    for r in &results {
        assert_eq!(r.status, TestStatus::Passed, "{}: {:?}", r.test_id, r.error);
    }
    assert_eq!(mock.email_count(), 0);
}

#[tokio::test]
async fn event_source_checks_run_when_the_session_advertises_one() {
    let (_, results) = run_catalog(MockAccount::new(), Some("push-eventsource/*")).await;
    assert_eq!(results.len(), 4);
    for r in &results {
        assert_eq!(r.status, TestStatus::Passed, "{}: {:?}", r.test_id, r.error);
    }
}

#[tokio::test]
async fn body_and_header_checks_read_every_fixture() {
    let (_, results) = run_catalog(MockAccount::new(), Some("email/body-*,email/header-*")).await;
    assert_eq!(results.len(), 34);
    let failed = failures(&results);
    assert!(failed.is_empty(), "unexpected failures:\n{}", failed.join("\n"));
}

#[tokio::test]
async fn email_query_filters_and_sorts_pass() {
    let (mock, results) = run_catalog(MockAccount::new(), Some("email/filter-*,email/sort-*,email/collapse-*")).await;
    assert!(results.len() >= 40);
    let failed = failures(&results);
    assert!(failed.is_empty(), "unexpected failures:\n{}", failed.join("\n"));
    assert_eq!(mock.email_count(), 0);
}

#[tokio::test]
async fn cross_account_checks_skip_without_a_second_account() {
    let (_, results) = run_catalog(MockAccount::new(), Some("binary/blob-copy-*")).await;
    assert_eq!(status(&results, "binary/blob-copy-same-account-error").status, TestStatus::Passed);
    let cross = status(&results, "binary/blob-copy-cross-account");
    assert_eq!(cross.status, TestStatus::Skipped);
    assert_eq!(cross.error.as_deref(), Some("No cross-account access available"));
}

// ── Failure detection ───────────────────────────────────────────────

#[tokio::test]
async fn broken_method_fails_only_its_checks() {
    let mock = MockAccount::new().with_failing_method("Thread/get", "serverFail");
    let (_, results) = run_catalog(mock, Some("thread/get-*,thread/replies-*,core/echo-*")).await;
    for r in &results {
        if r.test_id.starts_with("thread/get-") {
            assert_eq!(r.status, TestStatus::Failed, "{}", r.test_id);
            assert!(r.error.as_deref().unwrap_or("").contains("serverFail"));
        } else {
            assert_eq!(r.status, TestStatus::Passed, "{}: {:?}", r.test_id, r.error);
        }
    }
    assert!(results.iter().any(|r| r.test_id == "thread/replies-share-thread"));
}

#[tokio::test]
async fn failed_checks_carry_their_exchanges() {
    let mock = MockAccount::new().with_failing_method("Core/echo", "serverFail");
    let (_, results) = run_catalog(mock, Some("core/echo-basic")).await;
    let echo = status(&results, "core/echo-basic");
    assert_eq!(echo.status, TestStatus::Failed);
    let exchanges = echo.exchanges.as_ref().expect("exchanges recorded");
    assert_eq!(exchanges.len(), 1);
}
