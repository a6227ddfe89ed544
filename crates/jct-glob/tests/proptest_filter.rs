// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for `jct-glob` using proptest.

use jct_glob::{MatchDecision, Selection, TestFilter, category_of};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}".prop_map(|s| s.to_string())
}

fn check_id() -> impl Strategy<Value = String> {
    (segment(), segment()).prop_map(|(c, n)| format!("{c}/{n}"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // ── Exact id as a literal token always matches ──────────────────
    #[test]
    fn literal_id_matches_itself(id in check_id()) {
        prop_assert!(TestFilter::parse(&id).matches(&id));
    }

    // ── Category wildcard selects the whole category ────────────────
    #[test]
    fn category_star_selects_category(id in check_id()) {
        let filter = TestFilter::parse(&format!("{}/*", category_of(&id)));
        prop_assert!(filter.matches(&id));
    }

    // ── Lone star matches everything ────────────────────────────────
    #[test]
    fn lone_star_matches_all(id in check_id()) {
        prop_assert!(TestFilter::parse("*").matches(&id));
    }

    // ── Adding a token never shrinks the selection ──────────────────
    #[test]
    fn extra_token_is_monotone(id in check_id(), a in segment(), b in segment()) {
        let one = TestFilter::parse(&a).matches(&id);
        let two = TestFilter::parse(&format!("{a},{b}")).matches(&id);
        prop_assert!(!one || two);
    }

    // ── A trailing comma leaves an empty token that matches all ─────
    #[test]
    fn trailing_comma_matches_all(id in check_id(), a in segment()) {
        let pattern = format!("{a},");
        prop_assert!(TestFilter::parse(&pattern).matches(&id));
    }

    // ── Excluding a test's category always denies it ────────────────
    #[test]
    fn excluded_category_is_denied(id in check_id()) {
        let sel = Selection::new(Some("*"), &[category_of(&id).to_string()]);
        prop_assert_eq!(sel.decide(&id), MatchDecision::DeniedByExclude);
    }

    // ── Empty selection allows everything ───────────────────────────
    #[test]
    fn empty_selection_allows(id in check_id()) {
        prop_assert!(Selection::new(None, &[]).decide(&id).is_allowed());
    }
}
