// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-suite
//!
//! The conformance check catalog. [`catalog`] builds the full ordered
//! [`Registry`]; nothing registers itself at load time.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Define a check body taking the run context.
macro_rules! body {
    ($name:ident, |$ctx:ident| { $($body:tt)* }) => {
        fn $name($ctx: &mut ::jct_runtime::RunContext) -> ::jct_runtime::BoxFuture<'_, ::anyhow::Result<()>> {
            ::jct_runtime::boxed(async move { $($body)* })
        }
    };
}

/// Upload, download and blob copy (RFC 8620 §6).
pub mod binary;
/// Email get, changes, set, copy, import and parse (RFC 8621 §4).
pub mod email;
/// Email body parts, body values and header forms (RFC 8621 §4.1).
pub mod email_body;
/// Email/query filters, sorting, thread collapsing and queryChanges (RFC 8621 §4.4-4.5).
pub mod email_query;
/// Push over the event source (RFC 8620 §7.3).
pub mod eventsource;
/// Identity reads, changes and updates (RFC 8621 §6).
pub mod identity;
/// Mailbox reads and writes (RFC 8621 §2).
pub mod mailbox;
/// Session resource, echo and request-level errors (RFC 8620 §2-4).
pub mod protocol;
/// Push subscriptions delivered through the relay (RFC 8620 §7.2).
pub mod push;
/// Search snippets (RFC 8621 §5).
pub mod search_snippet;
/// Applicability predicates shared across categories.
pub mod skip;
/// Email submission reads, queries and sends (RFC 8621 §7).
pub mod submission;
/// Thread reads (RFC 8621 §3).
pub mod thread;
/// Vacation response singleton reads and updates (RFC 8621 §8).
pub mod vacation;

mod support;

use jct_runtime::Registry;

/// Category names in registration order.
pub const CATEGORIES: &[&str] = &[
    "core",
    "binary",
    "mailbox",
    "email",
    "thread",
    "search-snippet",
    "identity",
    "submission",
    "vacation",
    "push-subscription",
    "push-eventsource",
];

/// The full catalog in canonical run order.
pub fn catalog() -> Registry {
    let mut registry = Registry::new();
    registry.register_all(protocol::checks());
    registry.register_all(binary::checks());
    registry.register_all(mailbox::checks());
    registry.register_all(email::checks());
    registry.register_all(email_body::checks());
    registry.register_all(email_query::checks());
    registry.register_all(thread::checks());
    registry.register_all(search_snippet::checks());
    registry.register_all(identity::checks());
    registry.register_all(submission::checks());
    registry.register_all(vacation::checks());
    registry.register_all(push::checks());
    registry.register_all(eventsource::checks());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert!(catalog().duplicate_ids().is_empty());
    }

    #[test]
    fn categories_appear_in_declared_order() {
        let registry = catalog();
        let mut seen: Vec<&str> = Vec::new();
        for t in registry.all() {
            if seen.last() != Some(&t.category()) {
                seen.push(t.category());
            }
        }
        assert_eq!(seen, CATEGORIES);
    }

    #[test]
    fn every_check_cites_an_rfc_section() {
        for t in catalog().all() {
            assert!(t.rfc.starts_with("RFC"), "{} has no RFC", t.id);
            assert!(!t.section.is_empty(), "{} has no section", t.id);
            assert!(!t.name.is_empty(), "{} has no name", t.id);
        }
    }

    #[test]
    fn example_filter_selects_one_check() {
        let registry = catalog();
        let ids: Vec<&str> = registry
            .list(Some("email/query*"), &[])
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert!(ids.contains(&"email/query-basic"));
        assert!(ids.iter().all(|id| id.starts_with("email/query")));
    }
}
