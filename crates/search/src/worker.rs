use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use crate::api::{Evaluator, Nonce, Predicate, WorkTemplate};
use crate::coordinator::CompletionCoordinator;
use crate::error::SearchError;
use crate::partition::Subrange;

/// Terminal state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// This worker claimed the winning slot.
    Winner(Nonce),
    /// An accepted nonce was found but another worker claimed first.
    Loser,
    /// The subrange was fully scanned without an accepted nonce.
    Exhausted,
    /// The coordinator left `Running` before the subrange was done.
    Stopped,
}

pub(crate) struct WorkerReport {
    pub(crate) worker_idx: usize,
    pub(crate) result: Result<WorkerExit, SearchError>,
}

pub(crate) struct WorkerCtx<'a, E, P> {
    pub(crate) worker_idx: usize,
    pub(crate) range: Subrange,
    pub(crate) template: &'a WorkTemplate,
    pub(crate) evaluator: &'a E,
    pub(crate) predicate: &'a P,
    pub(crate) coordinator: &'a CompletionCoordinator,
    pub(crate) progress: Option<&'a AtomicU64>,
    pub(crate) progress_batch: u64,
}

// Aborts the search if the worker unwinds, so the others stop instead of scanning to the end.
struct AbortOnPanic<'a>(&'a CompletionCoordinator);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

pub(crate) fn run_worker<E, P>(ctx: WorkerCtx<'_, E, P>, reports: mpsc::Sender<WorkerReport>)
where
    E: Evaluator,
    P: Predicate<E::Digest>,
{
    let _guard = AbortOnPanic(ctx.coordinator);
    let worker_idx = ctx.worker_idx;

    tracing::debug!(
        worker = worker_idx,
        low = ctx.range.low(),
        high = ctx.range.high(),
        "worker started"
    );

    let mut evaluated = 0u64;
    let result = scan(&ctx, &mut evaluated);
    if let Some(progress) = ctx.progress {
        progress.fetch_add(evaluated % ctx.progress_batch.max(1), Ordering::Relaxed);
    }

    match &result {
        Ok(exit) => tracing::debug!(worker = worker_idx, ?exit, evaluated, "worker finished"),
        Err(err) => {
            // Stop the others; the orchestrator surfaces the error.
            ctx.coordinator.abort();
            tracing::debug!(worker = worker_idx, error = %err, evaluated, "worker failed");
        }
    }

    let _ = reports.send(WorkerReport { worker_idx, result });
}

fn scan<E, P>(ctx: &WorkerCtx<'_, E, P>, evaluated: &mut u64) -> Result<WorkerExit, SearchError>
where
    E: Evaluator,
    P: Predicate<E::Digest>,
{
    let batch = ctx.progress_batch.max(1);
    let mut scratch = ctx
        .evaluator
        .prepare(ctx.template)
        .map_err(|err| SearchError::Prepare {
            worker: ctx.worker_idx,
            source: Box::new(err),
        })?;

    for candidate in ctx.range.as_range() {
        if !ctx.coordinator.is_running() {
            return Ok(WorkerExit::Stopped);
        }

        // Subranges never extend past `Nonce::MAX + 1`.
        let nonce = candidate as Nonce;
        let digest = ctx
            .evaluator
            .evaluate(&mut scratch, nonce)
            .map_err(|err| SearchError::Evaluate {
                worker: ctx.worker_idx,
                nonce,
                source: Box::new(err),
            })?;

        *evaluated += 1;
        if *evaluated % batch == 0 {
            if let Some(progress) = ctx.progress {
                progress.fetch_add(batch, Ordering::Relaxed);
            }
        }

        if ctx.predicate.accept(&digest) {
            if ctx.coordinator.try_claim(nonce) {
                tracing::debug!(worker = ctx.worker_idx, nonce, "claimed winning nonce");
                return Ok(WorkerExit::Winner(nonce));
            }
            return Ok(WorkerExit::Loser);
        }
    }

    Ok(WorkerExit::Exhausted)
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;
    use crate::api::from_fn;
    use crate::coordinator::CompletionState;

    fn run<E, P>(
        range: Subrange,
        evaluator: &E,
        predicate: &P,
        coordinator: &CompletionCoordinator,
        progress: Option<&AtomicU64>,
    ) -> Result<WorkerExit, SearchError>
    where
        E: Evaluator,
        P: Predicate<E::Digest>,
    {
        let template = WorkTemplate::from(vec![0u8; 4]);
        let (tx, rx) = mpsc::channel();
        run_worker(
            WorkerCtx {
                worker_idx: 0,
                range,
                template: &template,
                evaluator,
                predicate,
                coordinator,
                progress,
                progress_batch: 4,
            },
            tx,
        );
        rx.recv().unwrap().result
    }

    #[test]
    fn winner_claims_first_accepted_nonce() {
        let c = CompletionCoordinator::new();
        let eval = from_fn(|_: &[u8], nonce| nonce);
        let pred = |d: &Nonce| *d == 13;
        let exit = run(Subrange::new(10, 20), &eval, &pred, &c, None).unwrap();
        assert_eq!(exit, WorkerExit::Winner(13));
        assert_eq!(c.peek(), CompletionState::Found(13));
    }

    #[test]
    fn loser_does_not_overwrite_winner() {
        let c = CompletionCoordinator::new();
        let eval = from_fn(|_: &[u8], nonce| nonce);
        // Another worker wins the race between this worker's accept and its claim.
        let pred = |_: &Nonce| {
            c.try_claim(99);
            true
        };
        let exit = run(Subrange::new(0, 5), &eval, &pred, &c, None).unwrap();
        assert_eq!(exit, WorkerExit::Loser);
        assert_eq!(c.peek(), CompletionState::Found(99));
    }

    #[test]
    fn stops_before_evaluating_once_search_is_over() {
        let c = CompletionCoordinator::new();
        assert!(c.request_stop());
        let eval = from_fn(|_: &[u8], _| -> u8 { panic!("must not evaluate") });
        let pred = |_: &u8| true;
        let exit = run(Subrange::new(0, 5), &eval, &pred, &c, None).unwrap();
        assert_eq!(exit, WorkerExit::Stopped);
    }

    #[test]
    fn empty_subrange_exhausts_immediately() {
        let c = CompletionCoordinator::new();
        let eval = from_fn(|_: &[u8], _| -> u8 { panic!("must not evaluate") });
        let pred = |_: &u8| true;
        let exit = run(Subrange::new(7, 7), &eval, &pred, &c, None).unwrap();
        assert_eq!(exit, WorkerExit::Exhausted);
        assert!(c.is_running());
    }

    #[test]
    fn progress_counts_every_candidate() {
        let c = CompletionCoordinator::new();
        let progress = AtomicU64::new(0);
        let eval = from_fn(|_: &[u8], nonce| nonce);
        let pred = |_: &Nonce| false;
        let exit = run(Subrange::new(0, 11), &eval, &pred, &c, Some(&progress)).unwrap();
        assert_eq!(exit, WorkerExit::Exhausted);
        assert_eq!(progress.load(Ordering::Relaxed), 11);
    }

    #[derive(Debug)]
    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("broken")
        }
    }

    impl std::error::Error for Broken {}

    struct FailsAt(Nonce);

    impl Evaluator for FailsAt {
        type Digest = ();
        type Scratch = ();
        type Error = Broken;

        fn prepare(&self, _template: &WorkTemplate) -> Result<(), Broken> {
            Ok(())
        }

        fn evaluate(&self, _scratch: &mut (), nonce: Nonce) -> Result<(), Broken> {
            if nonce == self.0 { Err(Broken) } else { Ok(()) }
        }
    }

    #[test]
    fn evaluator_failure_aborts_the_search() {
        let c = CompletionCoordinator::new();
        let pred = |_: &()| false;
        let err = run(Subrange::new(0, 10), &FailsAt(3), &pred, &c, None).unwrap_err();
        assert!(matches!(err, SearchError::Evaluate { worker: 0, nonce: 3, .. }));
        assert_eq!(c.peek(), CompletionState::Aborted);
    }
}
