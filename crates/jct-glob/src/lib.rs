// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-glob
//!
//! Check-id selection: comma-separated substring/glob filters plus category
//! exclusion.
//!
//! A filter token without `*` or `?` matches any id that contains it. A token
//! with either metacharacter is a glob anchored to the whole id, where `*`
//! spans any run of characters (including `/`) and `?` exactly one.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// Result of evaluating a check id against a [`Selection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// The id passes both exclusion and filter.
    Allowed,
    /// The id's category is excluded.
    DeniedByExclude,
    /// A filter is set and the id matched none of its tokens.
    DeniedByMissingInclude,
}

impl MatchDecision {
    /// Returns `true` only for [`MatchDecision::Allowed`].
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// One comma-separated piece of a filter.
#[derive(Debug, Clone)]
pub enum FilterToken {
    /// Literal text matched anywhere in the id.
    Substring(String),
    /// Glob anchored to the full id.
    Glob {
        /// The token as written.
        pattern: String,
        /// Compiled matcher.
        matcher: GlobMatcher,
    },
}

impl FilterToken {
    /// Classify and compile a single token.
    ///
    /// A glob that fails to compile degrades to a substring match on the raw
    /// token so a typo narrows the run instead of aborting it.
    pub fn parse(token: &str) -> Self {
        if !token.contains(['*', '?']) {
            return Self::Substring(token.to_string());
        }
        match compile_glob(token) {
            Ok(matcher) => Self::Glob {
                pattern: token.to_string(),
                matcher,
            },
            Err(err) => {
                warn!(target: "jct.filter", token, error = %err, "glob did not compile, using substring match");
                Self::Substring(token.to_string())
            }
        }
    }

    /// Does `id` satisfy this token?
    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Substring(s) => id.contains(s.as_str()),
            Self::Glob { matcher, .. } => matcher.is_match(id),
        }
    }
}

/// A parsed `--filter` value. Ids are kept when ANY token matches.
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    tokens: Vec<FilterToken>,
}

impl TestFilter {
    /// Parse comma-separated filter text. Empty text yields a filter with no
    /// tokens, which matches everything. A blank token inside non-empty text
    /// (`"a,"`, `"a, ,b"`) is an empty substring and so also matches every id.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let tokens = text.split(',').map(str::trim).map(FilterToken::parse).collect();
        Self { tokens }
    }

    /// Compiled tokens in input order.
    pub fn tokens(&self) -> &[FilterToken] {
        &self.tokens
    }

    /// `true` if the filter has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Does `id` pass the filter?
    pub fn matches(&self, id: &str) -> bool {
        self.tokens.is_empty() || self.tokens.iter().any(|t| t.matches(id))
    }
}

/// Filter plus excluded categories, evaluated exclusion first.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    filter: Option<TestFilter>,
    excluded: Vec<String>,
}

impl Selection {
    /// Build a selection from optional filter text and excluded categories.
    pub fn new(filter: Option<&str>, excluded: &[String]) -> Self {
        Self {
            filter: filter.map(TestFilter::parse).filter(|f| !f.is_empty()),
            excluded: excluded.to_vec(),
        }
    }

    /// Evaluate one id.
    pub fn decide(&self, id: &str) -> MatchDecision {
        if is_excluded(id, &self.excluded) {
            return MatchDecision::DeniedByExclude;
        }
        if self.filter.as_ref().is_some_and(|f| !f.matches(id)) {
            return MatchDecision::DeniedByMissingInclude;
        }
        MatchDecision::Allowed
    }
}

/// Leading path segment of a hierarchical id (`"email/query"` → `"email"`).
pub fn category_of(id: &str) -> &str {
    id.split_once('/').map_or(id, |(head, _)| head)
}

/// `true` if the id's category equals one of `categories`.
pub fn is_excluded(id: &str, categories: &[String]) -> bool {
    let cat = category_of(id);
    categories.iter().any(|c| c == cat)
}

/// Compile a filter token into an anchored matcher.
///
/// Only `*` and `?` are wildcards; every other glob metacharacter is taken
/// literally. Runs of `*` collapse to one.
pub fn compile_glob(token: &str) -> Result<GlobMatcher> {
    let mut pattern = String::with_capacity(token.len() + 4);
    let mut prev_star = false;
    for c in token.chars() {
        match c {
            '*' if prev_star => continue,
            '*' => pattern.push('*'),
            '?' => pattern.push('?'),
            '[' | ']' | '{' | '}' | '\\' | '!' => {
                pattern.push('\\');
                pattern.push(c);
            }
            _ => pattern.push(c),
        }
        prev_star = c == '*';
    }
    let glob = GlobBuilder::new(&pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .with_context(|| format!("invalid glob: {token}"))?;
    Ok(glob.compile_matcher())
}
