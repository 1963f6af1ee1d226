use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use crate::api::{Evaluator, Predicate, SearchConfig, SearchOutcome, WorkTemplate};
use crate::coordinator::{CompletionCoordinator, CompletionState};
use crate::error::SearchError;
use crate::partition::partition;
use crate::worker::{WorkerCtx, WorkerExit, WorkerReport, run_worker};

#[derive(Debug)]
struct StopSignal {
    cancelled: AtomicBool,
    coordinator: CompletionCoordinator,
}

/// Cancels a running (or the next) search of one [`SearchEngine`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    /// Stop the search. Workers observe the request before their next candidate.
    ///
    /// Cancellation is sticky: every later `do_work` call on the same engine returns
    /// [`SearchError::Cancelled`].
    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::SeqCst);
        self.signal.coordinator.abort();
    }

    /// Whether [`StopHandle::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::SeqCst)
    }
}

/// Parallel nonce search over one immutable [`WorkTemplate`].
///
/// Each [`SearchEngine::do_work`] call partitions `[0, max_nonce]`, spawns one thread per
/// subrange, blocks until a worker claims a winner or every subrange is exhausted, joins all
/// workers, and returns the outcome.
pub struct SearchEngine<E, P> {
    template: WorkTemplate,
    evaluator: E,
    predicate: P,
    config: SearchConfig,
    progress: Option<Arc<AtomicU64>>,
    signal: Arc<StopSignal>,
}

impl<E, P> SearchEngine<E, P>
where
    E: Evaluator,
    P: Predicate<E::Digest>,
{
    /// Build an engine with the default configuration.
    pub fn new(template: impl Into<WorkTemplate>, evaluator: E, predicate: P) -> Self {
        Self {
            template: template.into(),
            evaluator,
            predicate,
            config: SearchConfig::default(),
            progress: None,
            signal: Arc::new(StopSignal {
                cancelled: AtomicBool::new(false),
                coordinator: CompletionCoordinator::new(),
            }),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Add evaluated-candidate counts to `counter` while searching.
    pub fn with_progress(mut self, counter: Arc<AtomicU64>) -> Self {
        self.progress = Some(counter);
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// A handle that cancels this engine's searches from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: self.signal.clone(),
        }
    }

    /// Effective worker count for the next search.
    ///
    /// An explicit [`SearchConfig::workers`] is returned unchanged; otherwise the available
    /// hardware parallelism, clamped to `[1, max_nonce + 1]`.
    pub fn worker_count(&self) -> usize {
        if let Some(workers) = self.config.workers {
            return workers;
        }
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let domain = u64::from(self.config.max_nonce) + 1;
        available.min(usize::try_from(domain).unwrap_or(usize::MAX)).max(1)
    }

    /// Run one search over `[0, max_nonce]`.
    ///
    /// Returns [`SearchOutcome::Found`] with a nonce the predicate accepted, or
    /// [`SearchOutcome::Exhausted`] once every nonce was evaluated. Configuration problems are
    /// reported before any thread is spawned.
    pub fn do_work(&mut self) -> Result<SearchOutcome, SearchError> {
        let worker_count = self.worker_count();
        let ranges = partition(self.config.max_nonce, worker_count)?;

        let coordinator = &self.signal.coordinator;
        coordinator.reset();
        // Checked after the reset so a concurrent cancel cannot be lost.
        if self.signal.cancelled.load(Ordering::SeqCst) {
            coordinator.abort();
            return Err(SearchError::Cancelled);
        }

        tracing::debug!(
            workers = worker_count,
            max_nonce = self.config.max_nonce,
            template_len = self.template.len(),
            "search started"
        );
        let started_at = Instant::now();

        let template = &self.template;
        let evaluator = &self.evaluator;
        let predicate = &self.predicate;
        let progress = self.progress.as_deref();
        let progress_batch = self.config.progress_batch;

        let mut failure: Option<SearchError> = None;
        let (report_tx, report_rx) = mpsc::channel::<WorkerReport>();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(ranges.len());
            for (worker_idx, range) in ranges.iter().copied().enumerate() {
                let ctx = WorkerCtx {
                    worker_idx,
                    range,
                    template,
                    evaluator,
                    predicate,
                    coordinator,
                    progress,
                    progress_batch,
                };
                let reports = report_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("nonce-worker-{worker_idx}"))
                    .spawn_scoped(scope, move || run_worker(ctx, reports));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        coordinator.abort();
                        failure = Some(SearchError::Spawn {
                            worker: worker_idx,
                            source,
                        });
                        break;
                    }
                }
            }
            drop(report_tx);

            // Blocks until every worker has sent its final report (or dropped its sender).
            let mut exhausted = 0usize;
            for report in report_rx {
                match report.result {
                    Ok(WorkerExit::Exhausted) => {
                        exhausted += 1;
                        if exhausted == worker_count && coordinator.request_stop() {
                            tracing::debug!("all subranges exhausted");
                        }
                    }
                    Ok(WorkerExit::Winner(nonce)) => {
                        tracing::debug!(worker = report.worker_idx, nonce, "winner reported");
                    }
                    Ok(WorkerExit::Loser | WorkerExit::Stopped) => {}
                    Err(err) => {
                        coordinator.abort();
                        if failure.is_none() {
                            failure = Some(err);
                        } else {
                            tracing::warn!(
                                worker = report.worker_idx,
                                error = %err,
                                "additional worker failure"
                            );
                        }
                    }
                }
            }

            for (worker_idx, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    coordinator.abort();
                    failure.get_or_insert(SearchError::WorkerPanicked { worker: worker_idx });
                }
            }
        });

        let state = coordinator.peek();
        tracing::debug!(
            ?state,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "search finished"
        );

        match state {
            CompletionState::Found(nonce) => {
                if let Some(err) = failure {
                    tracing::warn!(error = %err, nonce, "worker failed after a winner was claimed");
                }
                Ok(SearchOutcome::Found(nonce))
            }
            CompletionState::Exhausted => Ok(SearchOutcome::Exhausted),
            CompletionState::Aborted | CompletionState::Running => {
                Err(failure.unwrap_or(SearchError::Cancelled))
            }
        }
    }
}
