// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TestStatus {
    /// The body completed without error.
    #[serde(rename = "pass")]
    Passed,
    /// The body returned an error or panicked.
    #[serde(rename = "fail")]
    Failed,
    /// The body was not run.
    #[serde(rename = "skip")]
    Skipped,
}

impl TestStatus {
    /// Short label as it appears in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "pass",
            Self::Failed => "fail",
            Self::Skipped => "skip",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request half of a captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// JSON body, or a `"<upload N bytes type>"` placeholder for binary bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// The response half of a captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, or a `"<binary N bytes>"` placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// One HTTP round trip recorded by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HttpExchange {
    /// What was sent.
    pub request: ExchangeRequest,
    /// What came back.
    pub response: ExchangeResponse,
}

/// The record produced for one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Fully qualified id (`category/local-id`).
    pub test_id: String,
    /// Human readable name.
    pub name: String,
    /// RFC the check targets, e.g. `"RFC8621"`.
    pub rfc: String,
    /// Section within the RFC.
    pub section: String,
    /// Whether a failure fails the run.
    pub required: bool,
    /// Outcome.
    pub status: TestStatus,
    /// Wall-clock time spent in the body.
    pub duration_ms: u64,
    /// Failure message, or the reason for a skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP exchanges captured while the check ran; absent when none were made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchanges: Option<Vec<HttpExchange>>,
}

impl TestResult {
    /// `true` for a failed required check.
    pub fn is_required_failure(&self) -> bool {
        self.required && self.status == TestStatus::Failed
    }
}

/// Counters over a set of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Number of results.
    pub total: usize,
    /// Results with status `pass`.
    pub passed: usize,
    /// Results with status `fail`.
    pub failed: usize,
    /// Results with status `skip`.
    pub skipped: usize,
    /// Required checks that passed.
    pub required_passed: usize,
    /// Required checks that failed.
    pub required_failed: usize,
    /// Recommended checks that passed.
    pub recommended_passed: usize,
    /// Recommended checks that failed.
    pub recommended_failed: usize,
}

impl ReportSummary {
    /// Tally `results`.
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut s = Self {
            total: results.len(),
            ..Self::default()
        };
        for r in results {
            match (r.status, r.required) {
                (TestStatus::Passed, true) => {
                    s.passed += 1;
                    s.required_passed += 1;
                }
                (TestStatus::Passed, false) => {
                    s.passed += 1;
                    s.recommended_passed += 1;
                }
                (TestStatus::Failed, true) => {
                    s.failed += 1;
                    s.required_failed += 1;
                }
                (TestStatus::Failed, false) => {
                    s.failed += 1;
                    s.recommended_failed += 1;
                }
                (TestStatus::Skipped, _) => s.skipped += 1,
            }
        }
        s
    }
}

/// The full run report written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    /// Session URL of the server under test.
    pub server: String,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time of the whole run.
    pub duration_ms: u64,
    /// Counters.
    pub summary: ReportSummary,
    /// Results in execution order.
    pub results: Vec<TestResult>,
}

impl TestReport {
    /// Build a report, computing the summary from `results`.
    pub fn new(server: impl Into<String>, duration_ms: u64, results: Vec<TestResult>) -> Self {
        Self {
            server: server.into(),
            timestamp: Utc::now(),
            duration_ms,
            summary: ReportSummary::from_results(&results),
            results,
        }
    }

    /// Process exit status implied by the report: `1` if any required check
    /// failed, otherwise `0`.
    pub fn exit_code(&self) -> i32 {
        if self.summary.required_failed > 0 { 1 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, required: bool, status: TestStatus) -> TestResult {
        TestResult {
            test_id: id.into(),
            name: id.into(),
            rfc: "RFC8621".into(),
            section: "4".into(),
            required,
            status,
            duration_ms: 1,
            error: None,
            exchanges: None,
        }
    }

    #[test]
    fn summary_partitions_by_status_and_requirement() {
        let results = vec![
            result("a/1", true, TestStatus::Passed),
            result("a/2", false, TestStatus::Failed),
            result("a/3", true, TestStatus::Skipped),
            result("a/4", true, TestStatus::Failed),
            result("a/5", false, TestStatus::Passed),
        ];
        let s = ReportSummary::from_results(&results);
        assert_eq!(s.total, 5);
        assert_eq!(s.passed + s.failed + s.skipped, s.total);
        assert_eq!((s.required_passed, s.required_failed), (1, 1));
        assert_eq!((s.recommended_passed, s.recommended_failed), (1, 1));
        assert_eq!(s.skipped, 1);
    }

    #[test]
    fn status_serializes_lowercase_short() {
        assert_eq!(serde_json::to_value(TestStatus::Passed).unwrap(), json!("pass"));
        assert_eq!(serde_json::to_value(TestStatus::Skipped).unwrap(), json!("skip"));
    }

    #[test]
    fn result_omits_absent_options() {
        let v = serde_json::to_value(result("x/y", true, TestStatus::Passed)).unwrap();
        assert!(v.get("error").is_none());
        assert!(v.get("exchanges").is_none());
        assert_eq!(v["testId"], json!("x/y"));
        assert_eq!(v["durationMs"], json!(1));
    }

    #[test]
    fn exit_code_tracks_required_failures() {
        let ok = TestReport::new("s", 0, vec![result("a/1", false, TestStatus::Failed)]);
        assert_eq!(ok.exit_code(), 0);
        let bad = TestReport::new("s", 0, vec![result("a/1", true, TestStatus::Failed)]);
        assert_eq!(bad.exit_code(), 1);
    }

    #[test]
    fn empty_report_is_all_zero() {
        let r = TestReport::new("s", 0, vec![]);
        assert_eq!(r.summary, ReportSummary::default());
        assert_eq!(r.exit_code(), 0);
    }
}
