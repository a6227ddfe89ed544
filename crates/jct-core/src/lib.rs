// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-core
//!
//! The stable contract for the JMAP conformance harness.
//!
//! Wire shapes exchanged with the server under test (session resource,
//! request/response envelopes, upload metadata) and the result types the
//! harness produces (per-check results, the run report, captured HTTP
//! exchanges).
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Per-check results, summaries and the run report.
pub mod report;
/// The JMAP session resource (RFC 8620 §2).
pub mod session;
/// Request and response envelopes (RFC 8620 §3).
pub mod wire;

pub use report::{
    ExchangeRequest, ExchangeResponse, HttpExchange, ReportSummary, TestReport, TestResult,
    TestStatus,
};
pub use session::{Account, Session};
pub use wire::{
    Invocation, JmapRequest, JmapResponse, RawResponse, ResultReference, UploadResponse, args,
};

/// A server-assigned JMAP identifier.
pub type Id = String;

/// Core capability URI; every session must advertise it.
pub const CAP_CORE: &str = "urn:ietf:params:jmap:core";
/// Mail capability URI (RFC 8621).
pub const CAP_MAIL: &str = "urn:ietf:params:jmap:mail";
/// Submission capability URI (RFC 8621 §7).
pub const CAP_SUBMISSION: &str = "urn:ietf:params:jmap:submission";
/// Vacation response capability URI (RFC 8621 §8).
pub const CAP_VACATION: &str = "urn:ietf:params:jmap:vacationresponse";

/// Returns `true` if `id` satisfies the JMAP `Id` syntax: 1–255 characters
/// from `[A-Za-z0-9_-]`.
pub fn is_valid_id(id: &str) -> bool {
    (1..=255).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::is_valid_id;

    #[test]
    fn accepts_base64url_alphabet() {
        assert!(is_valid_id("Ma1_b-2"));
        assert!(is_valid_id(&"a".repeat(255)));
    }

    #[test]
    fn rejects_empty_long_and_punctuated() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(&"a".repeat(256)));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("slash/id"));
        assert!(!is_valid_id("dötted"));
    }
}
