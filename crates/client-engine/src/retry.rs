use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::api::RetryPolicy;
use crate::backend::BackendError;
use crate::worker::InternalEvent;

const LOG_REPEAT_INTERVAL: Duration = Duration::from_secs(30);

fn is_permanent(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BackendError>()
        .is_some_and(BackendError::is_permanent)
}

/// Run `op` until it succeeds, fails permanently, or exhausts `policy.max_failures`.
///
/// Each failure is reported as an [`InternalEvent::Error`]; a repeated identical message is
/// reported at most once per 30 seconds.
pub(crate) async fn with_retry<T, F, Fut>(
    what: &str,
    policy: RetryPolicy,
    internal_tx: &mpsc::UnboundedSender<InternalEvent>,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_failures = policy.max_failures.max(1);
    let mut last_err: Option<String> = None;
    let mut last_log_at = Instant::now()
        .checked_sub(Duration::from_secs(3600))
        .unwrap_or_else(Instant::now);
    let mut attempts: u32 = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempts = attempts.saturating_add(1);

        if is_permanent(&err) {
            tracing::warn!(what, error = %format!("{err:#}"), "permanent failure");
            return Err(err.context(format!("{what} failed")));
        }
        if attempts >= max_failures {
            tracing::warn!(what, attempts, "giving up");
            return Err(err.context(format!("{what} failed after {attempts} attempts")));
        }

        let err_msg = format!("{err:#}");
        let should_log = last_err.as_deref() != Some(&err_msg)
            || last_log_at.elapsed() >= LOG_REPEAT_INTERVAL;
        if should_log {
            last_err = Some(err_msg.clone());
            last_log_at = Instant::now();
            let _ = internal_tx.send(InternalEvent::Error {
                message: format!(
                    "error: {what} failed (attempt {attempts}/{max_failures}): {err_msg}; retrying in {}s",
                    policy.delay.as_secs()
                ),
            });
        }
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_failures: u32) -> RetryPolicy {
        RetryPolicy {
            max_failures,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = &AtomicU32::new(0);

        let value = with_retry("fetch", fast(5), &tx, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("connection refused");
            }
            Ok(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Same message twice within the log interval: reported once.
        assert!(matches!(rx.try_recv(), Ok(InternalEvent::Error { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn gives_up_after_max_failures() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let calls = &AtomicU32::new(0);

        let err = with_retry("submit", fast(3), &tx, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("timeout"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(format!("{err:#}").contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = &AtomicU32::new(0);

        let err = with_retry("fetch", fast(10), &tx, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(BackendError::Unauthorized.into())
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.downcast_ref::<BackendError>().is_some());
        assert!(rx.try_recv().is_err());
    }
}
