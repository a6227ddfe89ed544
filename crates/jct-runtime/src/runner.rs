// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequential execution of a catalog against one prepared account.

use crate::context::RunContext;
use crate::lifecycle::{self, LifecycleError};
use crate::registry::{Registry, SkipDecision, TestDescriptor};
use futures::FutureExt;
use jct_client::{ClientError, JmapApi, JmapClient, Transport, cross_account_id};
use jct_config::HarnessConfig;
use jct_core::{TestResult, TestStatus};
use jct_error::{ErrorCode, HarnessError};
use jct_relay::RelayChannel;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Category whose checks need the push relay.
pub const PUSH_CATEGORY: &str = "push-subscription";

/// Caller-controlled knobs for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Comma-separated substrings and globs matched against check ids.
    pub filter: Option<String>,
    /// Destroy existing account data instead of refusing to start.
    pub force_destroy: bool,
    /// Only report failed checks to the observer.
    pub fail_only: bool,
}

/// Receives each result as soon as it is recorded.
pub trait RunObserver {
    /// Called with the 1-based position, the total and the result.
    fn on_result(&mut self, index: usize, total: usize, result: &TestResult);
}

impl<F> RunObserver for F
where
    F: FnMut(usize, usize, &TestResult),
{
    fn on_result(&mut self, index: usize, total: usize, result: &TestResult) {
        self(index, total, result);
    }
}

/// Errors that stop a run before or instead of producing results.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The configuration cannot drive a run.
    #[error("configuration error: {0}")]
    Config(String),

    /// Session bootstrap failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Cleaning or seeding the account failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl RunError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Client(e) => e.code(),
            Self::Lifecycle(e) => e.code(),
        }
    }
}

impl From<RunError> for HarnessError {
    fn from(err: RunError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            RunError::Client(e) => e.into(),
            RunError::Lifecycle(LifecycleError::AccountNotEmpty { emails, mailboxes }) => {
                HarnessError::new(code, message)
                    .with_context("emails", emails)
                    .with_context("mailboxes", mailboxes)
            }
            _ => HarnessError::new(code, message),
        }
    }
}

/// Runs a registry against a context, one check at a time.
#[derive(Debug)]
pub struct Runner {
    registry: Registry,
    options: RunOptions,
}

impl Runner {
    /// A runner for `registry` with `options`.
    pub fn new(registry: Registry, options: RunOptions) -> Self {
        Self { registry, options }
    }

    /// Checks this run would execute for `config`, in order.
    pub fn selected(&self, config: &HarnessConfig) -> Vec<&TestDescriptor> {
        self.registry
            .list(self.options.filter.as_deref(), &config.excluded_categories())
    }

    /// Clean, seed, execute every selected check, then tear down.
    ///
    /// Returns one result per selected check in registration order. Fails
    /// only when cleaning or seeding fails; teardown problems are logged.
    pub async fn execute(
        &self,
        ctx: &mut RunContext,
        observer: &mut dyn RunObserver,
    ) -> Result<Vec<TestResult>, RunError> {
        let tests = self.selected(&ctx.config);
        info!(target: "jct.runner", selected = tests.len(), total = self.registry.len(), "catalog filtered");

        if ctx.relay.is_none() && tests.iter().any(|t| t.category() == PUSH_CATEGORY) {
            if let Some(base) = ctx.config.relay().map(str::to_string) {
                ctx.relay = RelayChannel::connect(&base).await;
                match &ctx.relay {
                    Some(relay) => info!(target: "jct.runner", url = relay.url(), "relay channel open"),
                    None => warn!(target: "jct.runner", "relay unavailable; push checks will be skipped"),
                }
            }
        }

        info!(target: "jct.runner", "--- Cleaning account ---");
        if let Err(err) = lifecycle::clean(ctx, self.options.force_destroy).await {
            close_relay(ctx);
            return Err(err.into());
        }
        info!(target: "jct.runner", "--- Seeding test data ---");
        if let Err(err) = lifecycle::seed(ctx).await {
            lifecycle::teardown(ctx).await;
            close_relay(ctx);
            return Err(err.into());
        }
        ctx.drain_exchanges();

        info!(target: "jct.runner", "--- Running {} tests ---", tests.len());
        let total = tests.len();
        let mut results = Vec::with_capacity(total);
        for (i, test) in tests.into_iter().enumerate() {
            let result = run_one(test, ctx).await;
            if !self.options.fail_only || result.status == TestStatus::Failed {
                observer.on_result(i + 1, total, &result);
            }
            results.push(result);
        }

        info!(target: "jct.runner", "--- Tearing down ---");
        lifecycle::teardown(ctx).await;
        close_relay(ctx);
        Ok(results)
    }
}

fn close_relay(ctx: &mut RunContext) {
    if let Some(relay) = ctx.relay.take() {
        relay.close();
    }
}

/// Evaluate the skip predicate, run the body, and attach exchanges.
pub async fn run_one(test: &TestDescriptor, ctx: &mut RunContext) -> TestResult {
    let mut result = TestResult {
        test_id: test.id.clone(),
        name: test.name.clone(),
        rfc: test.rfc.clone(),
        section: test.section.clone(),
        required: test.required,
        status: TestStatus::Passed,
        duration_ms: 0,
        error: None,
        exchanges: None,
    };

    let decision = test.skip_if.map_or(SkipDecision::Run, |predicate| predicate(&*ctx));
    match decision {
        SkipDecision::Skip(reason) => {
            debug!(target: "jct.runner", test = %test.id, %reason, "skipped");
            result.status = TestStatus::Skipped;
            result.error = Some(reason);
        }
        SkipDecision::Run => {
            let start = Instant::now();
            let outcome = AssertUnwindSafe((test.body)(ctx)).catch_unwind().await;
            result.duration_ms = millis(start.elapsed());
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
            };
            if let Some(message) = failure {
                debug!(target: "jct.runner", test = %test.id, error = %message, "failed");
                result.status = TestStatus::Failed;
                result.error = Some(message);
            }
        }
    }

    let exchanges = ctx.drain_exchanges();
    if !exchanges.is_empty() {
        result.exchanges = Some(exchanges);
    }
    result
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Connect the configured accounts and build a fresh context.
pub async fn bootstrap(config: &HarnessConfig) -> Result<RunContext, RunError> {
    let session_url = config
        .session_url
        .clone()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| RunError::Config("session_url is required".into()))?;
    let timeout = Duration::from_millis(config.timeout_ms);

    let transport = Transport::new(config.auth_method, &config.accounts.primary, timeout)?;
    let primary = JmapClient::connect(transport, &session_url).await?;
    info!(
        target: "jct.runner",
        "Connected to {session_url} as {} ({})",
        primary.session().username,
        primary.account_id()
    );
    let cross = cross_account_id(primary.session(), primary.account_id());
    let mut ctx = RunContext::new(Arc::new(primary), config.clone()).with_cross_account(cross);

    if let Some(creds) = &config.accounts.secondary {
        let transport = Transport::new(config.auth_method, creds, timeout)?;
        let secondary = JmapClient::connect(transport, &session_url).await?;
        info!(
            target: "jct.runner",
            "Secondary account: {} ({})",
            secondary.session().username,
            secondary.account_id()
        );
        ctx = ctx.with_secondary(Arc::new(secondary));
    }
    Ok(ctx)
}

/// Bootstrap from `config` and execute `registry`.
pub async fn run(
    config: &HarnessConfig,
    registry: Registry,
    options: RunOptions,
    observer: &mut dyn RunObserver,
) -> Result<Vec<TestResult>, RunError> {
    let mut ctx = bootstrap(config).await?;
    Runner::new(registry, options).execute(&mut ctx, observer).await
}
