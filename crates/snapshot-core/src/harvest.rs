//! Fan-out harvesting of many endpoints.
//!
//! This module runs one snapshot: a single dispatcher task feeds the job list
//! into a bounded queue and a fixed pool of worker tasks drains it. Each
//! worker drives one endpoint at a time through a small retry state machine
//! against a fresh [`HarvestSession`].
//!
//! # Retry policy
//!
//! ```text
//! create ──err──────────────────────────────────────────► Failed(init)
//!   │
//!   ▼
//! Attempt(selective) ──ok──► Harvested
//!   │        └──already synced──► AlreadySynced
//!   │ err
//!   ▼
//! Attempt(full) ──ok──► Recovered
//!   │ err
//!   ▼
//! Failed(harvest)
//! ```
//!
//! Construction errors are never retried. Nothing an endpoint does, including
//! a panicking session, stops its worker: the worker records the outcome and
//! moves on to the next queue item.
//!
//! # Concurrency
//!
//! N workers + 1 dispatcher, joined before [`Snapshot::run`] returns. The
//! queue holds at most one endpoint beyond what the workers are busy with,
//! so the dispatcher blocks until a worker is ready. The only shared mutable
//! state is the [`FailureAggregator`]; per-worker stats are merged after the
//! join.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::SnapshotConfig;
use crate::endpoints::Endpoint;
use crate::error::AppError;
use crate::failures::FailureAggregator;
use crate::session::{HarvestMode, HarvestSession, SessionFactory, SessionOptions};
use crate::sync::{FailureStage, JobOutcome, SnapshotStats, SnapshotSummary};

/// Capacity of the handoff queue between dispatcher and workers.
const QUEUE_CAPACITY: usize = 1;

type SharedQueue = Arc<Mutex<mpsc::Receiver<Endpoint>>>;

/// Step of the per-endpoint retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Run the session once in the given mode.
    Attempt(HarvestMode),
    /// Processing is over.
    Done(JobOutcome),
}

impl RetryState {
    /// Every endpoint starts with a selective attempt.
    pub const START: RetryState = RetryState::Attempt(HarvestMode::Selective);

    /// Transition after an attempt in `mode` returned `result`.
    ///
    /// # Examples
    ///
    /// ```
    /// use snapshot_core::error::AppError;
    /// use snapshot_core::harvest::RetryState;
    /// use snapshot_core::session::HarvestMode;
    /// use snapshot_core::sync::JobOutcome;
    ///
    /// let next = RetryState::after(HarvestMode::Selective, &Err(AppError::AlreadySynced));
    /// assert_eq!(next, RetryState::Done(JobOutcome::AlreadySynced));
    ///
    /// let next = RetryState::after(HarvestMode::Selective, &Err(AppError::Timeout(30)));
    /// assert_eq!(next, RetryState::Attempt(HarvestMode::Full));
    /// ```
    pub fn after(mode: HarvestMode, result: &Result<(), AppError>) -> RetryState {
        match (mode, result) {
            (HarvestMode::Selective, Ok(())) => RetryState::Done(JobOutcome::Harvested),
            (HarvestMode::Full, Ok(())) => RetryState::Done(JobOutcome::Recovered),
            (HarvestMode::Selective, Err(e)) if e.is_already_synced() => {
                RetryState::Done(JobOutcome::AlreadySynced)
            }
            (HarvestMode::Selective, Err(_)) => RetryState::Attempt(HarvestMode::Full),
            (HarvestMode::Full, Err(_)) => {
                RetryState::Done(JobOutcome::Failed(FailureStage::Harvest))
            }
        }
    }
}

/// Harvests a batch of endpoints with a fixed pool of workers.
///
/// # Example
///
/// ```ignore
/// use snapshot_core::{EndpointSource, FailureSink, Snapshot, SnapshotConfig};
///
/// let endpoints = EndpointSource::default().shuffled(true).load()?;
/// let summary = Snapshot::new(factory, SnapshotConfig::default()).run(endpoints).await;
/// let report = FailureSink::default().persist(&summary.failed, &mut std::io::stdout())?;
/// ```
pub struct Snapshot<F: SessionFactory> {
    factory: Arc<F>,
    config: SnapshotConfig,
}

impl<F: SessionFactory> Snapshot<F> {
    pub fn new(factory: F, config: SnapshotConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
        }
    }

    /// Processes every endpoint and waits for all tasks to finish.
    ///
    /// Per-endpoint errors never escape; they end up in
    /// [`SnapshotSummary::failed`].
    pub async fn run(&self, endpoints: Vec<Endpoint>) -> SnapshotSummary {
        let workers = self.config.effective_workers();
        let total = endpoints.len();
        info!(endpoints = total, workers, "Starting snapshot");

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let queue: SharedQueue = Arc::new(Mutex::new(rx));
        let failures = FailureAggregator::new();

        let dispatcher = tokio::spawn(dispatch(endpoints, tx));

        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let worker = Worker {
                    name: format!("{:04}", i),
                    factory: Arc::clone(&self.factory),
                    options: self.config.session.clone(),
                    failures: failures.clone(),
                };
                tokio::spawn(worker.run(Arc::clone(&queue)))
            })
            .collect();

        let mut stats = SnapshotStats::new();
        for result in join_all(handles).await {
            match result {
                Ok(worker_stats) => stats.merge(&worker_stats),
                Err(e) => error!(error = %e, "Worker task aborted"),
            }
        }

        match dispatcher.await {
            Ok(dispatched) if dispatched < total => {
                warn!(dispatched, total, "Not every endpoint was dispatched")
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Dispatcher task aborted"),
        }

        let failed = failures.snapshot();
        info!(
            "Snapshot complete: {} harvested, {} recovered, {} already synced, {} failed out of {} total",
            stats.harvested,
            stats.recovered,
            stats.already_synced,
            failed.len(),
            total
        );

        SnapshotSummary { stats, failed }
    }
}

/// Pushes every endpoint into the queue in order, then closes it.
///
/// Returns the number of endpoints handed over.
async fn dispatch(endpoints: Vec<Endpoint>, queue: mpsc::Sender<Endpoint>) -> usize {
    let total = endpoints.len();
    for (i, endpoint) in endpoints.into_iter().enumerate() {
        if queue.send(endpoint).await.is_err() {
            warn!(
                undispatched = total - i,
                "All workers are gone, stopping dispatch"
            );
            return i;
        }
    }
    debug!(dispatched = total, "Dispatcher finished");
    total
}

struct Worker<F: SessionFactory> {
    name: String,
    factory: Arc<F>,
    options: SessionOptions,
    failures: FailureAggregator,
}

impl<F: SessionFactory> Worker<F> {
    async fn run(self, queue: SharedQueue) -> SnapshotStats {
        debug!(worker = %self.name, "Worker started");
        let mut stats = SnapshotStats::new();
        let mut picked = 0usize;

        loop {
            let next = {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            let Some(endpoint) = next else { break };

            picked += 1;
            info!("[{}@{}] {}", self.name, picked, endpoint);

            let outcome = self.process(&endpoint).await;
            if outcome.is_failure() {
                self.failures.record(endpoint);
            }
            stats.record(outcome);
        }

        debug!(worker = %self.name, processed = picked, "Worker finished");
        stats
    }

    async fn process(&self, endpoint: &Endpoint) -> JobOutcome {
        let created = AssertUnwindSafe(self.factory.create(endpoint))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panicked(panic)));

        let mut session = match created {
            Ok(session) => session,
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "failed (init)");
                return JobOutcome::Failed(FailureStage::Init);
            }
        };

        *session.options_mut() = SessionOptions {
            clean_before_decode: true,
            mode: HarvestMode::Selective,
            ..self.options.clone()
        };

        let mut state = RetryState::START;
        loop {
            match state {
                RetryState::Attempt(mode) => {
                    session.options_mut().mode = mode;
                    let result = attempt(&mut session).await;
                    state = RetryState::after(mode, &result);

                    if let Err(e) = &result {
                        match state {
                            RetryState::Attempt(next) => warn!(
                                endpoint = %endpoint,
                                error = %e,
                                "{} harvest failed, retrying in {} mode",
                                mode,
                                next
                            ),
                            RetryState::Done(JobOutcome::AlreadySynced) => {
                                debug!(endpoint = %endpoint, "Already synchronized")
                            }
                            RetryState::Done(_) => {
                                error!(endpoint = %endpoint, error = %e, "failed (harvest)")
                            }
                        }
                    }
                }
                RetryState::Done(outcome) => return outcome,
            }
        }
    }
}

/// Runs the session once, turning a panic into an ordinary attempt error.
async fn attempt<S: HarvestSession>(session: &mut S) -> Result<(), AppError> {
    AssertUnwindSafe(session.run())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panicked(panic)))
}

fn panicked(payload: Box<dyn Any + Send>) -> AppError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    AppError::Generic(format!("session panicked: {}", message))
}
