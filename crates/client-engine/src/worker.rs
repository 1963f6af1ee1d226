use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hashforge_search::{SearchEngine, SearchError, SearchOutcome};
use hashforge_sha256d::{HeaderEvaluator, Sha2, Target, header_hash, set_nonce};
use tokio::sync::mpsc;

use crate::api::{JobOutcome, JobSummary, RetryPolicy, Work, WorkSource};
use crate::retry::with_retry;

pub(crate) type HeaderSearch = SearchEngine<HeaderEvaluator<Sha2>, Target>;

pub(crate) enum InternalEvent {
    Warning { message: String },
    Error { message: String },
}

pub(crate) struct JobCtx<S> {
    pub(crate) job: JobSummary,
    pub(crate) work: Work,
    pub(crate) search: HeaderSearch,
    pub(crate) progress: Arc<AtomicU64>,
    pub(crate) source: Arc<S>,
    pub(crate) retry: RetryPolicy,
    pub(crate) internal_tx: mpsc::UnboundedSender<InternalEvent>,
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Search one job on a blocking thread, then verify and submit a found nonce.
pub(crate) async fn run_job<S: WorkSource>(ctx: JobCtx<S>) -> JobOutcome {
    let JobCtx {
        job,
        mut work,
        mut search,
        progress,
        source,
        retry,
        internal_tx,
    } = ctx;

    let started_at = Instant::now();
    let mut outcome = JobOutcome {
        job,
        nonce: None,
        exhausted: false,
        verify_mismatch: false,
        submit_accepted: None,
        cancelled: false,
        error: None,
        hashes: 0,
        search_ms: 0,
        submit_ms: 0,
        total_ms: 0,
    };

    let searched = tokio::task::spawn_blocking(move || search.do_work()).await;
    outcome.search_ms = elapsed_ms(started_at);
    outcome.hashes = progress.load(Ordering::Relaxed);

    let nonce = match searched {
        Ok(Ok(SearchOutcome::Found(nonce))) => nonce,
        Ok(Ok(SearchOutcome::Exhausted)) => {
            outcome.exhausted = true;
            outcome.total_ms = elapsed_ms(started_at);
            return outcome;
        }
        Ok(Err(SearchError::Cancelled)) => {
            outcome.cancelled = true;
            outcome.total_ms = elapsed_ms(started_at);
            return outcome;
        }
        Ok(Err(err)) => {
            outcome.error = Some(format!("search failed: {err:#}"));
            outcome.total_ms = elapsed_ms(started_at);
            return outcome;
        }
        Err(err) => {
            outcome.error = Some(format!("search task join error: {err:#}"));
            outcome.total_ms = elapsed_ms(started_at);
            return outcome;
        }
    };
    outcome.nonce = Some(nonce);

    let target = Target::from_le_bytes(work.target);
    let verified = set_nonce(&mut work.data, nonce)
        .and_then(|()| header_hash(&work.data, nonce))
        .map(|digest| target.is_met_by(&digest))
        .unwrap_or(false);
    if !verified {
        outcome.verify_mismatch = true;
        let _ = internal_tx.send(InternalEvent::Warning {
            message: format!(
                "warning: job {} nonce {nonce:#010x} does not meet the target on re-check; not submitting",
                outcome.job.job_id
            ),
        });
        outcome.total_ms = elapsed_ms(started_at);
        return outcome;
    }

    let submit_started = Instant::now();
    let src: &S = &source;
    let solved = &work;
    let submitted =
        with_retry("getwork submit", retry, &internal_tx, move || src.submit_work(solved)).await;
    outcome.submit_ms = elapsed_ms(submit_started);
    match submitted {
        Ok(accepted) => {
            tracing::info!(job_id = outcome.job.job_id, nonce, accepted, "solution submitted");
            outcome.submit_accepted = Some(accepted);
        }
        Err(err) => outcome.error = Some(format!("{err:#}")),
    }

    outcome.total_ms = elapsed_ms(started_at);
    outcome
}
