// SPDX-License-Identifier: MIT OR Apache-2.0
//! The ordered check catalog and its selection rules.

use crate::context::RunContext;
use futures::future::BoxFuture;
use jct_glob::{Selection, category_of};
use std::collections::BTreeSet;
use std::fmt;

/// A check body. Receives the run context for the duration of the check.
pub type TestBody = for<'a> fn(&'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>>;

/// Box the future of a check body.
pub fn boxed<'a, F>(future: F) -> BoxFuture<'a, anyhow::Result<()>>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'a,
{
    Box::pin(future)
}

/// Decides before the body runs whether a check applies to this server.
pub type SkipPredicate = fn(&RunContext) -> SkipDecision;

/// Outcome of a [`SkipPredicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipDecision {
    /// Run the body.
    Run,
    /// Do not run the body; record the check as skipped with this reason.
    Skip(String),
}

impl SkipDecision {
    /// Skip with `reason`.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    /// [`Run`](Self::Run) when `condition` holds, otherwise skip with `reason`.
    pub fn run_if(condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            Self::Run
        } else {
            Self::Skip(reason.into())
        }
    }
}

/// One registered check. Built once with the catalog and never mutated.
#[derive(Clone)]
pub struct TestDescriptor {
    /// Catalog-unique id, `category/name`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// RFC the check derives from, e.g. `"RFC8620"`.
    pub rfc: String,
    /// Section within the RFC.
    pub section: String,
    /// Required (MUST) versus recommended (SHOULD).
    pub required: bool,
    /// Optional applicability check.
    pub skip_if: Option<SkipPredicate>,
    /// The check itself.
    pub body: TestBody,
}

impl TestDescriptor {
    /// A required check with no RFC reference yet.
    pub fn new(id: impl Into<String>, name: impl Into<String>, body: TestBody) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rfc: String::new(),
            section: String::new(),
            required: true,
            skip_if: None,
            body,
        }
    }

    /// Set the RFC reference.
    #[must_use]
    pub fn rfc(mut self, rfc: impl Into<String>) -> Self {
        self.rfc = rfc.into();
        self
    }

    /// Set the RFC section.
    #[must_use]
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    /// Mark the check as recommended rather than required.
    #[must_use]
    pub fn recommended(mut self) -> Self {
        self.required = false;
        self
    }

    /// Attach a skip predicate.
    #[must_use]
    pub fn skip_if(mut self, predicate: SkipPredicate) -> Self {
        self.skip_if = Some(predicate);
        self
    }

    /// The leading path segment of the id.
    pub fn category(&self) -> &str {
        category_of(&self.id)
    }
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rfc", &self.rfc)
            .field("section", &self.section)
            .field("required", &self.required)
            .field("skip_if", &self.skip_if.is_some())
            .finish_non_exhaustive()
    }
}

/// Stamps a category, RFC and default section onto the checks it defines.
#[derive(Debug, Clone)]
pub struct Group {
    category: String,
    rfc: String,
    section: String,
}

impl Group {
    /// A group for `category` citing `rfc`, defaulting to `section`.
    pub fn new(category: &str, rfc: &str, section: &str) -> Self {
        Self {
            category: category.into(),
            rfc: rfc.into(),
            section: section.into(),
        }
    }

    /// Define `category/id` with the group defaults.
    pub fn define(&self, id: &str, name: &str, body: TestBody) -> TestDescriptor {
        TestDescriptor::new(format!("{}/{id}", self.category), name, body)
            .rfc(&self.rfc)
            .section(&self.section)
    }
}

/// The ordered catalog. Insertion order is run order.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    tests: Vec<TestDescriptor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one check.
    pub fn register(&mut self, descriptor: TestDescriptor) {
        self.tests.push(descriptor);
    }

    /// Append several checks in order.
    pub fn register_all(&mut self, descriptors: impl IntoIterator<Item = TestDescriptor>) {
        self.tests.extend(descriptors);
    }

    /// Every registered check.
    pub fn all(&self) -> &[TestDescriptor] {
        &self.tests
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Ids registered more than once.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut dups = BTreeSet::new();
        for t in &self.tests {
            if !seen.insert(t.id.as_str()) {
                dups.insert(t.id.as_str());
            }
        }
        dups.into_iter().collect()
    }

    /// Checks surviving category exclusion and then `filter`, in
    /// registration order.
    ///
    /// The filter is a comma-separated list of substrings and globs; a check
    /// is kept if any token matches its id.
    pub fn list(&self, filter: Option<&str>, excluded_categories: &[String]) -> Vec<&TestDescriptor> {
        let selection = Selection::new(filter, excluded_categories);
        self.tests
            .iter()
            .filter(|t| selection.decide(&t.id).is_allowed())
            .collect()
    }
}
