// SPDX-License-Identifier: MIT OR Apache-2.0
//! jct-runtime
//!
//! Orchestration layer of the conformance harness.
//!
//! Responsibilities:
//! - hold the ordered check catalog and select from it
//! - own the run context lent to each check body
//! - bring the account to an empty baseline, seed fixtures, tear them down
//! - execute checks one at a time and record a result for each

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Typed assertions returning [`AssertionFailure`].
pub mod assertions;
/// The mutable record shared by check bodies.
pub mod context;
/// Deterministic fixture messages and blobs.
pub mod fixtures;
/// Clean, seed and teardown of the account under test.
pub mod lifecycle;
/// Check descriptors and the ordered registry.
pub mod registry;
/// Sequential runner and session bootstrap.
pub mod runner;

pub use assertions::{AssertionFailure, Check};
pub use context::RunContext;
pub use lifecycle::{LifecycleError, MailboxNode, destroy_order};
pub use registry::{
    Group, Registry, SkipDecision, SkipPredicate, TestBody, TestDescriptor, boxed,
};
pub use runner::{RunError, RunObserver, RunOptions, Runner, bootstrap, run, run_one};

/// Re-exported so check bodies can name their return type.
pub use futures::future::BoxFuture;
