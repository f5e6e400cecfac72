//! One incremental synchronisation run.
//!
//! `Mirror` fetches the upper bound, then runs three stages concurrently:
//! - a `GapDetector` streaming missing identifiers,
//! - `worker_count` `FetchWorker`s pulling from that stream and batching,
//! - a single `BatchSink` persisting batches.
//!
//! A supervisor task joins the workers and only then releases the last batch
//! sender, so the sink sees the stream close exactly once every worker has
//! flushed. Fatal errors from the detector or the sink cancel the run token
//! and surface from [`Mirror::run`].

use super::gaps::{GapDetector, GapOutcome, GapStatus};
use super::lifecycle::RunLifecycle;
use super::sink::{BatchSink, SinkReport};
use super::worker::{FetchWorker, WorkerReport, WorkerShared};
use super::HANDOFF_CAPACITY;
use crate::runtime::config::MirrorConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::state::{PipelineState, StateTracker};
use crate::runtime::telemetry::Telemetry;
use crate::source::{FailureBreakdown, ItemSource};
use crate::store::Repository;
use anyhow::{Context, Error, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub state: PipelineState,
    /// `None` when the run was cancelled before the bound was known.
    pub upper_bound: Option<u64>,
    pub missing: u64,
    pub emitted: u64,
    pub fetched: u64,
    pub skipped: u64,
    /// `skipped` split by failure cause.
    pub skipped_by_cause: FailureBreakdown,
    pub batches: u64,
    pub persisted: u64,
}

impl RunReport {
    fn cancelled_early() -> Self {
        Self {
            state: PipelineState::Cancelled,
            upper_bound: None,
            missing: 0,
            emitted: 0,
            fetched: 0,
            skipped: 0,
            skipped_by_cause: FailureBreakdown::default(),
            batches: 0,
            persisted: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == PipelineState::Done
    }
}

pub struct Mirror<S, R>
where
    S: ItemSource,
    R: Repository<S::Item>,
{
    source: Arc<S>,
    repo: Arc<R>,
    worker_count: usize,
    batch_size: usize,
    metrics_interval: Duration,
    telemetry: Arc<Telemetry>,
    state: StateTracker,
}

impl<S, R> Mirror<S, R>
where
    S: ItemSource,
    R: Repository<S::Item>,
{
    pub fn new(config: &MirrorConfig, source: Arc<S>, repo: Arc<R>) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "MirrorConfig should have been validated at construction time"
        );

        Self {
            source,
            repo,
            worker_count: config.worker_count(),
            batch_size: config.batch_size(),
            metrics_interval: config.metrics_interval(),
            telemetry: Arc::new(Telemetry::default()),
            state: StateTracker::new(),
        }
    }

    /// Watches state transitions of the current and future runs.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> PipelineState {
        self.state.current()
    }

    /// Counters of the most recent run.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Brings the store up to date with the remote collection.
    ///
    /// Cancelling `shutdown` stops new fetches; items already fetched are
    /// still flushed and persisted before this returns with a `Cancelled`
    /// report. Failing to fetch the bound, enumerate the store, or persist a
    /// batch aborts the run with an error.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<RunReport> {
        self.state.reset();
        self.telemetry = Arc::new(Telemetry::default());

        let lifecycle =
            RunLifecycle::spawn(shutdown, Arc::clone(&self.telemetry), self.metrics_interval);
        let result = self.drive(&lifecycle).await;
        let fatal = lifecycle.error();
        lifecycle.shutdown().await;

        let result = match (result, fatal) {
            (Ok(report), None) => Ok(report),
            (Ok(_), Some(err)) => Err(err),
            (Err(err), _) => Err(err),
        };

        match result {
            Ok(report) => {
                self.state.transition(report.state);
                tracing::info!(
                    state = %report.state,
                    upper_bound = ?report.upper_bound,
                    missing = report.missing,
                    fetched = report.fetched,
                    skipped = report.skipped,
                    skipped_by_cause = %report.skipped_by_cause,
                    persisted = report.persisted,
                    "mirror run finished"
                );
                Ok(report)
            }
            Err(err) => {
                self.state.transition(PipelineState::Failed);
                Err(err).context("mirror run aborted")
            }
        }
    }

    async fn drive(&self, lifecycle: &RunLifecycle) -> Result<RunReport> {
        let run_token = lifecycle.run_token.clone();
        let fatal = lifecycle.fatal_handler();

        self.state.transition(PipelineState::FetchingBound);
        let upper_bound = tokio::select! {
            biased;
            _ = run_token.cancelled() => {
                tracing::info!("run cancelled before the upper bound was known");
                return Ok(RunReport::cancelled_early());
            }
            bound = self.source.upper_bound() => bound.context("failed to fetch upper bound")?,
        };

        self.state.transition(PipelineState::Streaming);
        tracing::info!(
            upper_bound,
            workers = self.worker_count,
            batch_size = self.batch_size,
            "starting mirror run"
        );

        let (ids_tx, ids_rx) = mpsc::channel::<u64>(HANDOFF_CAPACITY);
        let (batch_tx, batch_rx) = mpsc::channel(HANDOFF_CAPACITY);

        let sink = BatchSink::new(Arc::clone(&self.repo), batch_rx, Arc::clone(&self.telemetry));
        let sink_fatal = fatal.clone();
        let sink_handle = tokio::spawn(async move {
            sink.run()
                .await
                .map_err(|err| sink_fatal.trigger("batch sink", err))
        });

        let detector = GapDetector::new(
            Arc::clone(&self.repo),
            upper_bound,
            ids_tx,
            run_token.clone(),
            Arc::clone(&self.telemetry),
        );
        let gap_fatal = fatal.clone();
        let gap_handle = tokio::spawn(async move {
            detector
                .run()
                .await
                .map_err(|err| gap_fatal.trigger("gap detector", err))
        });

        let shared = WorkerShared::new(
            Arc::clone(&self.source),
            Arc::new(Mutex::new(ids_rx)),
            batch_tx,
            Arc::clone(&self.telemetry),
        );
        let supervisor = self.spawn_supervisor(shared, run_token.clone(), fatal.clone());

        let gap = join_stage(gap_handle.await, &fatal, "gap detector");
        let workers = supervisor.await.unwrap_or_else(|err| {
            fatal.trigger("worker supervisor", Error::from(err));
            Vec::new()
        });

        self.state.transition(PipelineState::Draining);
        tracing::debug!("all workers finished; draining batch sink");
        let sink = join_stage(sink_handle.await, &fatal, "batch sink");

        if let Some(err) = fatal.error() {
            return Err(err);
        }

        let (Some(gap), Some(sink)) = (gap, sink) else {
            // every path that drops a stage result also triggers the handler
            return Err(anyhow::anyhow!("pipeline stage ended without a result"));
        };

        Ok(summarise(
            upper_bound,
            gap,
            &workers,
            sink,
            self.telemetry.fetch_failures(),
            run_token.is_cancelled(),
        ))
    }

    /// Spawns the workers plus the task that joins them and then drops the
    /// last batch sender.
    fn spawn_supervisor(
        &self,
        shared: WorkerShared<S>,
        run_token: CancellationToken,
        fatal: FatalErrorHandler,
    ) -> JoinHandle<Vec<WorkerReport>> {
        let handles: Vec<_> = (0..self.worker_count)
            .map(|id| {
                let worker =
                    FetchWorker::new(id, self.batch_size, run_token.clone(), shared.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        tokio::spawn(async move {
            let mut reports = Vec::with_capacity(handles.len());
            for (idx, joined) in join_all(handles).await.into_iter().enumerate() {
                match joined {
                    Ok(report) => {
                        tracing::debug!(
                            worker = report.worker,
                            fetched = report.fetched,
                            skipped = report.skipped,
                            batches = report.batches,
                            "fetch worker finished"
                        );
                        reports.push(report);
                    }
                    Err(err) => {
                        tracing::warn!(worker = idx, error = %err, "fetch worker terminated unexpectedly");
                        fatal.trigger("fetch worker", Error::from(err));
                    }
                }
            }
            drop(shared);
            tracing::debug!("batch stream closed");
            reports
        })
    }
}

/// Builds the report of a run whose stages all returned.
///
/// A cancellation that lands after every emitted identifier was fetched or
/// skipped lost nothing, so such a run still counts as `Done`.
fn summarise(
    upper_bound: u64,
    gap: GapOutcome,
    workers: &[WorkerReport],
    sink: SinkReport,
    skipped_by_cause: FailureBreakdown,
    cancelled: bool,
) -> RunReport {
    let fetched: u64 = workers.iter().map(|report| report.fetched).sum();
    let skipped: u64 = workers.iter().map(|report| report.skipped).sum();
    let all_handled = gap.emitted == fetched + skipped;

    let state = if gap.status == GapStatus::Completed && (!cancelled || all_handled) {
        PipelineState::Done
    } else {
        PipelineState::Cancelled
    };

    RunReport {
        state,
        upper_bound: Some(upper_bound),
        missing: gap.missing,
        emitted: gap.emitted,
        fetched,
        skipped,
        skipped_by_cause,
        batches: sink.batches,
        persisted: sink.persisted,
    }
}

/// Unwraps a stage task result. Stage errors were already routed through the
/// fatal handler; panics are routed here.
fn join_stage<T>(
    joined: std::result::Result<Result<T>, tokio::task::JoinError>,
    fatal: &FatalErrorHandler,
    stage: &'static str,
) -> Option<T> {
    match joined {
        Ok(Ok(value)) => Some(value),
        Ok(Err(_)) => None,
        Err(err) => {
            fatal.trigger(stage, Error::from(err));
            None
        }
    }
}
