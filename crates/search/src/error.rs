use thiserror::Error;

use crate::api::Nonce;

/// Invalid search configuration, rejected before any worker is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Zero workers were requested.
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    /// The single-nonce domain `[0, 0]` cannot be split across more than one worker.
    #[error("nonce domain [0, 0] cannot be split across {workers} workers")]
    DegenerateDomain {
        /// Requested worker count.
        workers: usize,
    },
}

/// Errors returned by [`crate::SearchEngine::do_work`].
///
/// Exhausting the domain is not an error; see [`crate::SearchOutcome::Exhausted`].
#[derive(Debug, Error)]
pub enum SearchError {
    /// The configuration was rejected.
    #[error("invalid search configuration: {0}")]
    Config(#[from] ConfigError),

    /// The evaluator failed while preparing a worker's scratch.
    #[error("worker {worker} could not prepare its work template")]
    Prepare {
        /// Worker index (0-based).
        worker: usize,
        /// Evaluator error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The evaluator failed on a candidate.
    #[error("worker {worker} failed to evaluate nonce {nonce}")]
    Evaluate {
        /// Worker index (0-based).
        worker: usize,
        /// Candidate being evaluated.
        nonce: Nonce,
        /// Evaluator error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn worker {worker}")]
    Spawn {
        /// Worker index (0-based).
        worker: usize,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Worker index (0-based).
        worker: usize,
    },

    /// The search was cancelled through a [`crate::StopHandle`].
    #[error("search cancelled")]
    Cancelled,
}
