//! Public API types for the in-process `hashforge` mining service.

use std::future::Future;
use std::time::Duration;

use hashforge_search::Nonce;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Length of getwork `data` (80-byte header plus SHA-256 padding).
pub const WORK_DATA_LEN: usize = 128;

/// One unit of getwork: the padded header and the little-endian target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    /// Header bytes as received; the nonce lives at bytes 76..80.
    pub data: [u8; WORK_DATA_LEN],
    /// 256-bit little-endian target.
    pub target: [u8; 32],
}

/// Source of work templates and sink for solutions.
///
/// Errors are `anyhow` so implementations can attach context; wrap a
/// [`BackendError`](crate::BackendError) to mark a failure as permanent (not retried).
pub trait WorkSource: Send + Sync + 'static {
    /// Fetch a fresh work template.
    fn fetch_work(&self) -> impl Future<Output = anyhow::Result<Work>> + Send;

    /// Submit `work` with the winning nonce written into its data. Returns whether the node
    /// accepted it.
    fn submit_work(&self, work: &Work) -> impl Future<Output = anyhow::Result<bool>> + Send;
}

/// Bounded, fixed-delay retry of failed node requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up on one request.
    pub max_failures: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Default attempt budget.
    pub const DEFAULT_MAX_FAILURES: u32 = 10;

    /// Default pause between attempts.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_failures: Self::DEFAULT_MAX_FAILURES,
            delay: Self::DEFAULT_DELAY,
        }
    }
}

/// Configuration for the in-process mining service.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Node JSON-RPC endpoint (e.g. `http://127.0.0.1:8332/`).
    pub node_url: Url,

    /// RPC basic-auth user.
    pub rpc_user: Option<String>,

    /// RPC basic-auth password.
    pub rpc_password: Option<String>,

    /// Search threads per job; `None` uses the available hardware parallelism.
    ///
    /// An explicit count the search cannot partition (zero, or more than one with
    /// `max_nonce == 0`) stops the engine at startup with a configuration error.
    pub threads: Option<usize>,

    /// Inclusive upper bound of the nonce range searched per job.
    pub max_nonce: Nonce,

    /// Retry policy for fetch and submit.
    pub retry: RetryPolicy,

    /// How long to sleep after a fetch gave up.
    pub idle_sleep: Duration,

    /// How often the service samples the hash counter to emit progress events.
    pub progress_tick: Duration,

    /// Maximum number of completed jobs retained in the snapshot.
    pub recent_jobs_max: usize,

    /// Stop after this many finished jobs.
    pub max_jobs: Option<u64>,
}

impl EngineConfig {
    /// Default idle backoff after a failed fetch.
    pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_secs(10);

    /// Default progress sampling tick.
    pub const DEFAULT_PROGRESS_TICK: Duration = Duration::from_millis(500);

    /// Default size of the recent-jobs ring buffer.
    pub const DEFAULT_RECENT_JOBS_MAX: usize = 100;

    /// Config for `node_url` with every other field at its default.
    pub fn new(node_url: Url) -> Self {
        Self {
            node_url,
            rpc_user: None,
            rpc_password: None,
            threads: None,
            max_nonce: Nonce::MAX,
            retry: RetryPolicy::default(),
            idle_sleep: Self::DEFAULT_IDLE_SLEEP,
            progress_tick: Self::DEFAULT_PROGRESS_TICK,
            recent_jobs_max: Self::DEFAULT_RECENT_JOBS_MAX,
            max_jobs: None,
        }
    }
}

/// A lightweight summary of a fetched job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSummary {
    /// Local job counter (1-based).
    pub job_id: u64,
    /// Target as big-endian hex.
    pub target: String,
    /// Unix timestamp (seconds) when the work was fetched.
    pub fetched_at: i64,
}

/// Result of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobOutcome {
    /// Job metadata.
    pub job: JobSummary,
    /// Winning nonce, if the search found one.
    pub nonce: Option<Nonce>,
    /// Whether the whole nonce range was searched without a hit.
    pub exhausted: bool,
    /// Whether the local re-check of a found nonce failed (not submitted).
    pub verify_mismatch: bool,
    /// Node verdict, if submission happened.
    pub submit_accepted: Option<bool>,
    /// Whether the search was cancelled by a stop request.
    #[serde(default)]
    pub cancelled: bool,
    /// Human-readable failure message, for search/submit errors.
    pub error: Option<String>,
    /// Candidates evaluated.
    pub hashes: u64,
    /// Search time (milliseconds).
    pub search_ms: u64,
    /// Submission time (milliseconds).
    pub submit_ms: u64,
    /// Total job time (milliseconds).
    pub total_ms: u64,
}

/// Engine event stream payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Engine started.
    Started,
    /// Engine is stopping (graceful shutdown requested).
    StopRequested,
    /// A new job started searching.
    JobStarted {
        /// Job summary.
        job: JobSummary,
    },
    /// Search progress for the current job.
    Progress {
        /// Candidates evaluated so far.
        hashes_done: u64,
        /// Speed estimate in hashes/second.
        hashes_per_sec: u64,
    },
    /// A job finished (success or failure).
    JobFinished {
        /// Job outcome.
        outcome: JobOutcome,
    },
    /// A warning from the engine.
    Warning {
        /// Warning message.
        message: String,
    },
    /// A non-fatal error from the engine.
    Error {
        /// Error message.
        message: String,
    },
    /// Engine stopped.
    Stopped,
}

/// Current engine state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Whether the engine has been asked to stop.
    pub stop_requested: bool,
    /// Job being searched, if any.
    pub job: Option<JobSummary>,
    /// Candidates evaluated for the current job.
    pub hashes_done: u64,
    /// Latest speed estimate in hashes/second.
    pub hashes_per_sec: u64,
    /// Jobs finished (cancelled ones excluded).
    pub jobs_finished: u64,
    /// Solutions the node accepted.
    pub accepted: u64,
    /// Solutions the node rejected.
    pub rejected: u64,
    /// Recently finished jobs (newest last).
    pub recent_jobs: Vec<JobOutcome>,
}

/// Handle to a running in-process engine instance.
pub struct EngineHandle {
    pub(crate) inner: std::sync::Arc<crate::engine::EngineInner>,
    pub(crate) join: tokio::task::JoinHandle<anyhow::Result<()>>,
}

/// Start mining against the getwork node in `config`.
pub fn start_engine(config: EngineConfig) -> EngineHandle {
    crate::engine::start_engine(config)
}

/// Start mining against a caller-supplied [`WorkSource`].
pub fn start_engine_with_source<S: WorkSource>(config: EngineConfig, source: S) -> EngineHandle {
    crate::engine::start_engine_with_source(config, source)
}

impl EngineHandle {
    /// Subscribe to the engine event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Get the latest engine snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.snapshot_rx.borrow().clone()
    }

    /// Request a graceful shutdown: cancel the running search and stop fetching work.
    pub fn request_stop(&self) {
        self.inner.request_stop();
    }

    /// Wait for the engine to stop, returning the engine task result.
    pub async fn wait(self) -> anyhow::Result<()> {
        match self.join.await {
            Ok(res) => res,
            Err(err) => Err(anyhow::anyhow!("engine task join error: {err}")),
        }
    }
}
