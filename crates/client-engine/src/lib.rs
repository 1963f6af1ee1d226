#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! In-process mining service for `hashforge` (getwork fetch, parallel nonce search, submission).

/// Public API for the engine crate.
pub mod api;

mod backend;
mod engine;
mod retry;
mod worker;

pub use api::{
    EngineConfig, EngineEvent, EngineHandle, JobOutcome, JobSummary, RetryPolicy,
    StatusSnapshot, WORK_DATA_LEN, Work, WorkSource, start_engine, start_engine_with_source,
};
pub use backend::{BackendError, GetworkClient};
