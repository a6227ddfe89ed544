// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-harness runs against the in-memory account: clean, seed, run the
//! catalog, tear down, and build the report the CLI writes.

use jct_config::HarnessConfig;
use jct_core::{TestReport, TestResult, TestStatus};
use jct_error::{EXIT_FATAL, EXIT_OK, EXIT_REQUIRED_FAILED, ErrorCode, HarnessError};
use jct_mock::MockAccount;
use jct_runtime::{LifecycleError, RunContext, RunError, RunOptions, Runner};
use std::sync::Arc;

fn offline() -> HarnessConfig {
    HarnessConfig {
        relay_url: None,
        ..HarnessConfig::default()
    }
}

async fn run(mock: Arc<MockAccount>, options: RunOptions) -> Result<Vec<TestResult>, RunError> {
    let mut ctx = RunContext::new(mock, offline());
    let mut observer = |_: usize, _: usize, _: &TestResult| {};
    Runner::new(jct_suite::catalog(), options)
        .execute(&mut ctx, &mut observer)
        .await
}

fn filtered(filter: &str) -> RunOptions {
    RunOptions {
        filter: Some(filter.into()),
        ..RunOptions::default()
    }
}

// ── Preconditions ───────────────────────────────────────────────────

#[tokio::test]
async fn populated_account_is_refused_without_force() {
    let mock = Arc::new(MockAccount::new().with_emails(3).with_custom_mailbox("Old", None));
    let err = run(mock.clone(), RunOptions::default()).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Lifecycle(LifecycleError::AccountNotEmpty { emails: 3, mailboxes: 1 })
    ));

    let fatal: HarnessError = err.into();
    assert_eq!(fatal.code, ErrorCode::PreconditionAccountNotEmpty);
    assert_eq!(fatal.exit_code(), EXIT_FATAL);
    assert_eq!(fatal.context["emails"], 3);

    assert_eq!(mock.email_count(), 3, "nothing is touched when refusing");
    assert_eq!(mock.custom_mailboxes(), vec!["Old".to_string()]);
}

#[tokio::test]
async fn force_cleans_then_runs() {
    let mock = Arc::new(MockAccount::new().with_emails(3).with_custom_mailbox("Old", None));
    let options = RunOptions {
        force_destroy: true,
        ..filtered("core/echo-*")
    };
    let results = run(mock.clone(), options).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.status == TestStatus::Passed));
    assert_eq!(mock.email_count(), 0);
    assert!(mock.custom_mailboxes().is_empty());
}

// ── Reports ─────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_run_exits_zero() {
    let results = run(Arc::new(MockAccount::new()), RunOptions::default())
        .await
        .unwrap();
    let report = TestReport::new("http://mock/.well-known/jmap", 10, results);
    assert_eq!(report.summary.required_failed, 0);
    assert_eq!(
        report.summary.total,
        report.summary.passed + report.summary.failed + report.summary.skipped
    );
    assert!(report.summary.skipped > 0, "vacation and identity checks skip");
    assert_eq!(report.exit_code(), EXIT_OK);
}

#[tokio::test]
async fn required_failure_exits_one() {
    let mock = Arc::new(MockAccount::new().with_failing_method("Core/echo", "serverFail"));
    let results = run(mock, filtered("core/echo-")).await.unwrap();
    let report = TestReport::new("http://mock/.well-known/jmap", 10, results);
    assert_eq!(report.summary.required_failed, 3);
    assert_eq!(report.exit_code(), EXIT_REQUIRED_FAILED);
}

#[tokio::test]
async fn recommended_failure_keeps_exit_zero() {
    let mock = Arc::new(MockAccount::new().with_failing_method("Blob/copy", "serverFail"));
    let results = run(mock, filtered("binary/blob-copy-same-account-error")).await.unwrap();
    let report = TestReport::new("http://mock/.well-known/jmap", 10, results);
    assert_eq!(report.summary.recommended_failed, 1);
    assert_eq!(report.summary.required_failed, 0);
    assert_eq!(report.exit_code(), EXIT_OK);
}

#[tokio::test]
async fn report_serializes_with_wire_names() {
    let mock = Arc::new(MockAccount::new().with_failing_method("Core/echo", "serverFail"));
    let results = run(mock, filtered("core/echo-basic,vacation/get-singleton"))
        .await
        .unwrap();
    let report = TestReport::new("http://mock/.well-known/jmap", 10, results);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["server"], "http://mock/.well-known/jmap");
    assert!(json["timestamp"].is_string());
    assert_eq!(json["summary"]["requiredFailed"], 1);

    let echo = &json["results"][0];
    assert_eq!(echo["testId"], "core/echo-basic");
    assert_eq!(echo["status"], "fail");
    assert_eq!(echo["rfc"], "RFC8620");
    assert!(echo["durationMs"].is_u64());
    assert!(echo["exchanges"].is_array());

    let vacation = &json["results"][1];
    assert_eq!(vacation["status"], "skip");
    assert!(vacation["error"].is_string());
    assert!(vacation.get("exchanges").is_none());
}

#[tokio::test]
async fn fail_only_reports_only_failures() {
    let mock = Arc::new(MockAccount::new().with_failing_method("Thread/get", "serverFail"));
    let mut ctx = RunContext::new(mock, offline());
    let mut seen: Vec<String> = Vec::new();
    let mut observer = |_: usize, _: usize, r: &TestResult| seen.push(r.test_id.clone());
    let options = RunOptions {
        fail_only: true,
        ..filtered("thread/,core/echo-basic")
    };
    let results = Runner::new(jct_suite::catalog(), options)
        .execute(&mut ctx, &mut observer)
        .await
        .unwrap();
    assert!(results.len() > seen.len());
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|id| id.starts_with("thread/get-")));
}
