// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end runner behaviour over the in-memory account.

use jct_config::HarnessConfig;
use jct_core::{ReportSummary, TestResult, TestStatus};
use jct_mock::MockAccount;
use jct_runtime::assertions::{array, ensure_eq, ensure_len};
use jct_runtime::{
    BoxFuture, Group, LifecycleError, Registry, RunContext, RunError, RunOptions, Runner,
    SkipDecision, boxed,
};
use serde_json::json;
use std::sync::Arc;

// ── Bodies ──────────────────────────────────────────────────────────

fn passes(_: &mut RunContext) -> BoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async { Ok(()) })
}

fn fails(_: &mut RunContext) -> BoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async { Err(anyhow::anyhow!("expected 1, got 2")) })
}

fn panics(_: &mut RunContext) -> BoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async {
        let values: Vec<u32> = Vec::new();
        if values.is_empty() {
            panic!("boom");
        }
        Ok(())
    })
}

fn reads_fixture(ctx: &mut RunContext) -> BoxFuture<'_, anyhow::Result<()>> {
    boxed(async move {
        let id = ctx.mailbox("folderA")?.to_string();
        let resp = ctx.call("Mailbox/get", json!({ "ids": [id] })).await?;
        let list = array(&resp["list"], "list")?;
        ensure_len(list, 1, None)?;
        ensure_eq(&list[0]["name"], &json!("Test Folder A"), None)?;
        Ok(())
    })
}

fn calls_unknown_method(ctx: &mut RunContext) -> BoxFuture<'_, anyhow::Result<()>> {
    boxed(async move {
        ctx.call("Nope/get", json!({})).await?;
        Ok(())
    })
}

fn never(_: &RunContext) -> SkipDecision {
    SkipDecision::skip("not advertised")
}

fn catalog() -> Registry {
    let g = Group::new("demo", "RFC8620", "3");
    let mut r = Registry::new();
    r.register_all([
        g.define("a-pass", "A", passes),
        g.define("b-fail", "B", fails),
        g.define("c-optional-fail", "C", fails).recommended(),
        g.define("d-skip", "D", passes).skip_if(never),
        g.define("e-fixture", "E", reads_fixture),
        g.define("f-panic", "F", panics),
        g.define("g-method-error", "G", calls_unknown_method),
    ]);
    r
}

fn context(mock: &Arc<MockAccount>) -> RunContext {
    RunContext::new(mock.clone(), HarnessConfig::default())
}

async fn run(options: RunOptions) -> (Arc<MockAccount>, Vec<TestResult>, Vec<(usize, String)>) {
    let mock = Arc::new(MockAccount::new());
    let mut ctx = context(&mock);
    let mut seen = Vec::new();
    let mut observer = |i: usize, _total: usize, r: &TestResult| seen.push((i, r.test_id.clone()));
    let results = Runner::new(catalog(), options)
        .execute(&mut ctx, &mut observer)
        .await
        .unwrap();
    (mock, results, seen)
}

fn status_of<'a>(results: &'a [TestResult], id: &str) -> &'a TestResult {
    results.iter().find(|r| r.test_id == id).unwrap()
}

// ── Ordering and status ─────────────────────────────────────────────

#[tokio::test]
async fn one_result_per_check_in_registration_order() {
    let (_, results, seen) = run(RunOptions::default()).await;
    let ids: Vec<&str> = results.iter().map(|r| r.test_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "demo/a-pass",
            "demo/b-fail",
            "demo/c-optional-fail",
            "demo/d-skip",
            "demo/e-fixture",
            "demo/f-panic",
            "demo/g-method-error",
        ]
    );
    assert_eq!(seen.len(), 7);
    assert_eq!(seen[0], (1, "demo/a-pass".to_string()));
}

#[tokio::test]
async fn required_and_recommended_failures_are_counted_apart() {
    let (_, results, _) = run(RunOptions {
        filter: Some("a-pass,b-fail,c-optional".into()),
        ..RunOptions::default()
    })
    .await;
    let statuses: Vec<TestStatus> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Failed]
    );
    let summary = ReportSummary::from_results(&results);
    assert_eq!(summary.required_failed, 1);
    assert_eq!(summary.recommended_failed, 1);
    assert_eq!(summary.required_passed, 1);
}

#[tokio::test]
async fn skip_predicate_prevents_body_and_records_reason() {
    let (_, results, _) = run(RunOptions::default()).await;
    let skipped = status_of(&results, "demo/d-skip");
    assert_eq!(skipped.status, TestStatus::Skipped);
    assert_eq!(skipped.error.as_deref(), Some("not advertised"));
    assert_eq!(skipped.duration_ms, 0);
    assert!(skipped.exchanges.is_none());
}

#[tokio::test]
async fn failures_carry_messages() {
    let (_, results, _) = run(RunOptions::default()).await;
    assert_eq!(
        status_of(&results, "demo/b-fail").error.as_deref(),
        Some("expected 1, got 2")
    );
    let panicked = status_of(&results, "demo/f-panic");
    assert_eq!(panicked.status, TestStatus::Failed);
    assert_eq!(panicked.error.as_deref(), Some("panicked: boom"));
    let method = status_of(&results, "demo/g-method-error");
    assert_eq!(method.status, TestStatus::Failed);
    assert!(method.error.as_deref().unwrap().contains("unknownMethod"));
}

#[tokio::test]
async fn exchanges_belong_to_the_check_that_made_them() {
    let (_, results, _) = run(RunOptions::default()).await;
    assert!(status_of(&results, "demo/a-pass").exchanges.is_none());
    let fixture = status_of(&results, "demo/e-fixture");
    assert_eq!(fixture.status, TestStatus::Passed, "{:?}", fixture.error);
    assert_eq!(fixture.exchanges.as_ref().map(Vec::len), Some(1));
}

#[tokio::test]
async fn fail_only_reports_only_failures() {
    let (_, results, seen) = run(RunOptions {
        fail_only: true,
        ..RunOptions::default()
    })
    .await;
    assert_eq!(results.len(), 7);
    let reported: Vec<&str> = seen.iter().map(|(_, id)| id.as_str()).collect();
    assert_eq!(
        reported,
        vec![
            "demo/b-fail",
            "demo/c-optional-fail",
            "demo/f-panic",
            "demo/g-method-error"
        ]
    );
}

#[tokio::test]
async fn empty_selection_still_cleans_and_tears_down() {
    let (mock, results, _) = run(RunOptions {
        filter: Some("nothing-matches".into()),
        ..RunOptions::default()
    })
    .await;
    assert!(results.is_empty());
    assert_eq!(mock.email_count(), 0);
    assert!(mock.custom_mailboxes().is_empty());
}

// ── Lifecycle integration ───────────────────────────────────────────

#[tokio::test]
async fn teardown_runs_after_the_loop() {
    let (mock, _, _) = run(RunOptions::default()).await;
    assert_eq!(mock.email_count(), 0);
    assert!(mock.custom_mailboxes().is_empty());
}

#[tokio::test]
async fn dirty_account_aborts_before_any_check() {
    let mock = Arc::new(MockAccount::new().with_custom_mailbox("Old", None));
    let mut ctx = context(&mock);
    let mut calls = 0;
    let mut observer = |_: usize, _: usize, _: &TestResult| calls += 1;
    let err = Runner::new(catalog(), RunOptions::default())
        .execute(&mut ctx, &mut observer)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Lifecycle(LifecycleError::AccountNotEmpty { .. })
    ));
    assert_eq!(err.code(), jct_error::ErrorCode::PreconditionAccountNotEmpty);
    assert_eq!(calls, 0);
    assert_eq!(mock.custom_mailboxes(), vec!["Old"]);
}

#[tokio::test]
async fn force_destroy_cleans_then_runs() {
    let mock = Arc::new(MockAccount::new().with_custom_mailbox("Old", None).with_emails(4));
    let mut ctx = context(&mock);
    let mut observer = |_: usize, _: usize, _: &TestResult| {};
    let results = Runner::new(
        catalog(),
        RunOptions {
            filter: Some("demo/e-*".into()),
            force_destroy: true,
            ..RunOptions::default()
        },
    )
    .execute(&mut ctx, &mut observer)
    .await
    .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, TestStatus::Passed);
    assert!(mock.custom_mailboxes().is_empty());
}

#[tokio::test]
async fn excluded_categories_follow_config() {
    let mut registry = Registry::new();
    registry.register(Group::new("submission", "RFC8621", "7").define("get", "Get", passes));
    registry.register(Group::new("core", "RFC8620", "2").define("session", "Session", passes));
    let runner = Runner::new(registry, RunOptions::default());
    let config = HarnessConfig::default();
    let ids: Vec<&str> = runner
        .selected(&config)
        .into_iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ids, vec!["core/session"]);
}
