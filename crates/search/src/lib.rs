#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Parallel nonce-space search (partitioning, per-worker scanning, first-winner completion).
//!
//! The engine is generic over two caller-supplied capabilities: an [`Evaluator`] that turns
//! `(template, nonce)` into a digest and a [`Predicate`] that accepts or rejects a digest.
//! It never looks inside a digest itself.

/// Public API types for the search crate.
pub mod api;

mod coordinator;
mod engine;
mod error;
mod partition;
mod worker;

pub use api::{
    Evaluator, FnEvaluator, Nonce, Predicate, SearchConfig, SearchOutcome, WorkTemplate, from_fn,
};
pub use coordinator::{CompletionCoordinator, CompletionState};
pub use engine::{SearchEngine, StopHandle};
pub use error::{ConfigError, SearchError};
pub use partition::{Subrange, partition};
