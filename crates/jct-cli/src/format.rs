// SPDX-License-Identifier: MIT OR Apache-2.0
//! Progress and summary lines printed while a run is in flight.

use jct_core::{ReportSummary, TestResult, TestStatus};
use jct_runtime::TestDescriptor;

/// Four-letter label for a result. Failed recommended checks are reported as
/// warnings since they do not affect the exit status.
pub fn status_label(result: &TestResult) -> &'static str {
    match (result.status, result.required) {
        (TestStatus::Passed, _) => "PASS",
        (TestStatus::Failed, true) => "FAIL",
        (TestStatus::Failed, false) => "WARN",
        (TestStatus::Skipped, _) => "SKIP",
    }
}

/// One progress line, e.g. `[ 3/42] PASS core/echo-basic (12ms)`.
///
/// Failures and skips carry their message on the same line.
pub fn progress_line(index: usize, total: usize, result: &TestResult) -> String {
    let width = total.to_string().len();
    let mut line = format!(
        "[{index:>width$}/{total}] {} {} ({}ms)",
        status_label(result),
        result.test_id,
        result.duration_ms
    );
    if let Some(ref error) = result.error {
        line.push_str(": ");
        line.push_str(first_line(error));
    }
    line
}

/// Closing summary printed after the last check.
pub fn summary_line(summary: &ReportSummary, duration_ms: u64) -> String {
    let mut line = format!(
        "{} checks in {:.1}s: {} passed, {} failed, {} skipped",
        summary.total,
        duration_ms as f64 / 1000.0,
        summary.passed,
        summary.failed,
        summary.skipped
    );
    if summary.failed > 0 {
        line.push_str(&format!(
            " ({} required, {} recommended)",
            summary.required_failed, summary.recommended_failed
        ));
    }
    line
}

/// Listing line for a catalog entry, used by `list`.
pub fn descriptor_line(test: &TestDescriptor) -> String {
    let level = if test.required { "required" } else { "recommended" };
    format!(
        "{:<48} {} \u{a7}{:<6} {level}",
        test.id, test.rfc, test.section
    )
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}
