use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use hashforge_search::{ConfigError, SearchConfig, SearchEngine, StopHandle, partition};
use hashforge_sha256d::{HeaderEvaluator, Sha2, Target};
use tokio::sync::{broadcast, mpsc, watch};

use crate::api::{
    EngineConfig, EngineEvent, EngineHandle, JobOutcome, JobSummary, RetryPolicy, StatusSnapshot,
    Work, WorkSource,
};
use crate::backend::GetworkClient;
use crate::retry::with_retry;
use crate::worker::{InternalEvent, JobCtx, run_job};

pub(crate) struct EngineInner {
    pub(crate) event_tx: broadcast::Sender<EngineEvent>,
    pub(crate) snapshot_rx: watch::Receiver<StatusSnapshot>,
    stop_requested: AtomicBool,
    notify: tokio::sync::Notify,
}

impl EngineInner {
    pub(crate) fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(EngineEvent::StopRequested);
            self.notify.notify_waiters();
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

struct ActiveJob {
    summary: JobSummary,
    stop: StopHandle,
    task: tokio::task::JoinHandle<JobOutcome>,
}

#[derive(Default)]
struct SpeedSample {
    at: Option<Instant>,
    hashes_done: u64,
    hashes_per_sec: u64,
}

struct EngineRuntime<S> {
    source: Arc<S>,
    cfg: EngineConfig,

    progress: Arc<AtomicU64>,
    speed: SpeedSample,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,

    active: Option<ActiveJob>,
    fetch_task: Option<tokio::task::JoinHandle<anyhow::Result<Work>>>,
    fetch_backoff: Option<Pin<Box<tokio::time::Sleep>>>,
    next_job_id: u64,

    jobs_finished: u64,
    accepted: u64,
    rejected: u64,
    recent_jobs: VecDeque<JobOutcome>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    inner: Arc<EngineInner>,
}

impl<S: WorkSource> EngineRuntime<S> {
    fn build_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            stop_requested: self.inner.should_stop(),
            job: self.active.as_ref().map(|a| a.summary.clone()),
            hashes_done: self.speed.hashes_done,
            hashes_per_sec: self.speed.hashes_per_sec,
            jobs_finished: self.jobs_finished,
            accepted: self.accepted,
            rejected: self.rejected,
            recent_jobs: self.recent_jobs.iter().cloned().collect(),
        }
    }

    fn push_snapshot(&self) {
        let snap = self.build_snapshot();
        let _ = self.snapshot_tx.send(snap);
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn job_limit_reached(&self) -> bool {
        self.cfg
            .max_jobs
            .is_some_and(|max| self.jobs_finished >= max)
    }

    fn maybe_start_fetch(&mut self) {
        if self.inner.should_stop() {
            return;
        }
        if self.active.is_some() || self.fetch_task.is_some() || self.fetch_backoff.is_some() {
            return;
        }

        let source = self.source.clone();
        let retry = self.cfg.retry;
        let internal_tx = self.internal_tx.clone();
        self.fetch_task = Some(tokio::spawn(async move {
            let src: &S = &source;
            with_retry("getwork fetch", retry, &internal_tx, move || src.fetch_work()).await
        }));
    }

    fn start_job(&mut self, work: Work) {
        self.next_job_id += 1;
        let target = Target::from_le_bytes(work.target);
        let summary = JobSummary {
            job_id: self.next_job_id,
            target: target.to_string(),
            fetched_at: Utc::now().timestamp(),
        };

        self.progress.store(0, Ordering::Relaxed);
        self.speed = SpeedSample {
            at: Some(Instant::now()),
            ..SpeedSample::default()
        };

        let search = SearchEngine::new(work.data.to_vec(), HeaderEvaluator::<Sha2>::new(), target)
            .with_config(SearchConfig {
                max_nonce: self.cfg.max_nonce,
                workers: self.cfg.threads,
                ..SearchConfig::default()
            })
            .with_progress(self.progress.clone());
        let stop = search.stop_handle();

        tracing::debug!(job_id = summary.job_id, target = %summary.target, "job started");
        let task = tokio::spawn(run_job(JobCtx {
            job: summary.clone(),
            work,
            search,
            progress: self.progress.clone(),
            source: self.source.clone(),
            retry: self.cfg.retry,
            internal_tx: self.internal_tx.clone(),
        }));

        self.emit(EngineEvent::JobStarted {
            job: summary.clone(),
        });
        self.active = Some(ActiveJob {
            summary,
            stop,
            task,
        });
        self.push_snapshot();
    }

    fn handle_fetch_result(
        &mut self,
        res: Result<anyhow::Result<Work>, tokio::task::JoinError>,
    ) {
        self.fetch_task = None;

        match res {
            Ok(Ok(work)) => {
                if !self.inner.should_stop() {
                    self.start_job(work);
                }
            }
            Ok(Err(err)) => {
                self.fetch_backoff = Some(Box::pin(tokio::time::sleep(self.cfg.idle_sleep)));
                self.emit(EngineEvent::Error {
                    message: format!("work fetch error: {err:#}"),
                });
            }
            Err(err) => {
                self.fetch_backoff = Some(Box::pin(tokio::time::sleep(self.cfg.idle_sleep)));
                self.emit(EngineEvent::Error {
                    message: format!("work fetch task join error: {err:#}"),
                });
            }
        }
    }

    fn handle_job_finished(&mut self, res: Result<JobOutcome, tokio::task::JoinError>) {
        let Some(active) = self.active.take() else {
            return;
        };

        let outcome = match res {
            Ok(outcome) => outcome,
            Err(err) => {
                self.emit(EngineEvent::Error {
                    message: format!("job task join error: {err:#}"),
                });
                self.push_snapshot();
                return;
            }
        };

        self.speed = SpeedSample::default();
        if !outcome.cancelled {
            self.jobs_finished += 1;
        }
        match outcome.submit_accepted {
            Some(true) => self.accepted += 1,
            Some(false) => self.rejected += 1,
            None => {}
        }
        if let Some(err) = &outcome.error {
            self.emit(EngineEvent::Error {
                message: format!("job {}: {err}", active.summary.job_id),
            });
        }

        self.recent_jobs.push_back(outcome.clone());
        while self.recent_jobs.len() > self.cfg.recent_jobs_max.max(1) {
            self.recent_jobs.pop_front();
        }
        self.emit(EngineEvent::JobFinished { outcome });

        if self.job_limit_reached() {
            self.inner.request_stop();
        }
        self.push_snapshot();
    }

    fn handle_internal_event(&mut self, ev: InternalEvent) {
        match ev {
            InternalEvent::Warning { message } => self.emit(EngineEvent::Warning { message }),
            InternalEvent::Error { message } => self.emit(EngineEvent::Error { message }),
        }
    }

    fn sample_progress(&mut self) {
        if self.active.is_none() {
            return;
        }
        let hashes_done = self.progress.load(Ordering::Relaxed);
        let now = Instant::now();

        if let Some(prev_at) = self.speed.at {
            let dt = now.duration_since(prev_at).as_secs_f64();
            let delta = hashes_done.saturating_sub(self.speed.hashes_done);
            if dt > 0.0 && delta > 0 {
                self.speed.hashes_per_sec = (delta as f64 / dt).round() as u64;
            }
        }
        if hashes_done == self.speed.hashes_done {
            return;
        }
        self.speed.at = Some(now);
        self.speed.hashes_done = hashes_done;

        self.emit(EngineEvent::Progress {
            hashes_done,
            hashes_per_sec: self.speed.hashes_per_sec,
        });
        self.push_snapshot();
    }

    async fn run(mut self) -> anyhow::Result<()> {
        self.emit(EngineEvent::Started);
        self.push_snapshot();

        let mut progress_tick = tokio::time::interval(self.cfg.progress_tick);
        progress_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if self.inner.should_stop() {
                if let Some(task) = self.fetch_task.take() {
                    task.abort();
                }
                self.fetch_backoff = None;
                match &self.active {
                    Some(active) => active.stop.cancel(),
                    None => break,
                }
            }

            self.maybe_start_fetch();

            tokio::select! {
                _ = progress_tick.tick() => self.sample_progress(),
                _ = self.inner.notify.notified() => {}
                Some(ev) = self.internal_rx.recv() => self.handle_internal_event(ev),
                res = async {
                    match self.fetch_task.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                } => self.handle_fetch_result(res),
                res = async {
                    match self.active.as_mut() {
                        Some(active) => (&mut active.task).await,
                        None => std::future::pending().await,
                    }
                } => self.handle_job_finished(res),
                _ = async {
                    match self.fetch_backoff.as_mut() {
                        Some(sleep) => sleep.as_mut().await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.fetch_backoff = None;
                }
            }
        }

        while let Ok(ev) = self.internal_rx.try_recv() {
            self.handle_internal_event(ev);
        }
        self.emit(EngineEvent::Stopped);
        self.push_snapshot();
        Ok(())
    }
}

fn normalize(cfg: &mut EngineConfig) {
    if cfg.retry.max_failures == 0 {
        cfg.retry.max_failures = RetryPolicy::DEFAULT_MAX_FAILURES;
    }
    if cfg.retry.delay == Duration::ZERO {
        cfg.retry.delay = RetryPolicy::DEFAULT_DELAY;
    }
    if cfg.idle_sleep == Duration::ZERO {
        cfg.idle_sleep = EngineConfig::DEFAULT_IDLE_SLEEP;
    }
    if cfg.progress_tick == Duration::ZERO {
        cfg.progress_tick = EngineConfig::DEFAULT_PROGRESS_TICK;
    }
    if cfg.recent_jobs_max == 0 {
        cfg.recent_jobs_max = EngineConfig::DEFAULT_RECENT_JOBS_MAX;
    }
}

/// Reject explicit thread counts the search would refuse for every job.
fn check_threads(cfg: &EngineConfig) -> Result<(), ConfigError> {
    match cfg.threads {
        Some(threads) => partition(cfg.max_nonce, threads).map(|_| ()),
        None => Ok(()),
    }
}

fn new_inner() -> (Arc<EngineInner>, watch::Sender<StatusSnapshot>) {
    let (event_tx, _) = broadcast::channel::<EngineEvent>(1024);
    let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot::default());

    let inner = Arc::new(EngineInner {
        event_tx,
        snapshot_rx,
        stop_requested: AtomicBool::new(false),
        notify: tokio::sync::Notify::new(),
    });
    (inner, snapshot_tx)
}

pub(crate) fn start_engine(cfg: EngineConfig) -> EngineHandle {
    let (inner, snapshot_tx) = new_inner();
    let join = tokio::spawn({
        let inner = inner.clone();
        async move {
            let source = match GetworkClient::new(
                cfg.node_url.clone(),
                cfg.rpc_user.clone(),
                cfg.rpc_password.clone(),
            ) {
                Ok(source) => source,
                Err(err) => {
                    let message = format!("build http client: {err:#}");
                    let _ = inner
                        .event_tx
                        .send(EngineEvent::Error { message: message.clone() });
                    let _ = inner.event_tx.send(EngineEvent::Stopped);
                    return Err(anyhow::anyhow!("{message}"));
                }
            };
            run_engine(inner, snapshot_tx, cfg, source).await
        }
    });
    EngineHandle { inner, join }
}

pub(crate) fn start_engine_with_source<S: WorkSource>(
    cfg: EngineConfig,
    source: S,
) -> EngineHandle {
    let (inner, snapshot_tx) = new_inner();
    let join = tokio::spawn(run_engine(inner.clone(), snapshot_tx, cfg, source));
    EngineHandle { inner, join }
}

async fn run_engine<S: WorkSource>(
    inner: Arc<EngineInner>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    mut cfg: EngineConfig,
    source: S,
) -> anyhow::Result<()> {
    normalize(&mut cfg);
    if let Err(err) = check_threads(&cfg) {
        let message = format!("invalid search configuration: {err}");
        let _ = inner
            .event_tx
            .send(EngineEvent::Error { message: message.clone() });
        let _ = inner.event_tx.send(EngineEvent::Stopped);
        return Err(anyhow::Error::new(err).context("invalid search configuration"));
    }
    tracing::debug!(
        node = %cfg.node_url,
        threads = ?cfg.threads,
        max_nonce = cfg.max_nonce,
        "mining service starting"
    );

    let (internal_tx, internal_rx) = mpsc::unbounded_channel::<InternalEvent>();
    let runtime = EngineRuntime {
        source: Arc::new(source),
        cfg,
        progress: Arc::new(AtomicU64::new(0)),
        speed: SpeedSample::default(),
        internal_tx,
        internal_rx,
        active: None,
        fetch_task: None,
        fetch_backoff: None,
        next_job_id: 0,
        jobs_finished: 0,
        accepted: 0,
        rejected: 0,
        recent_jobs: VecDeque::new(),
        snapshot_tx,
        inner,
    };

    runtime.run().await
}
