use crate::model::Item;
use crate::pipeline::batch::Batch;
use crate::runtime::telemetry::Telemetry;
use crate::source::{FailureCause, ItemSource};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Identifier stream shared by every worker; whichever worker holds the lock
/// receives the next identifier.
pub type SharedIdReceiver = Arc<Mutex<mpsc::Receiver<u64>>>;

pub type BatchSender<T> = mpsc::Sender<Vec<T>>;

/// Handles every worker of a run clones from the orchestrator.
pub struct WorkerShared<S: ItemSource> {
    pub(crate) source: Arc<S>,
    pub(crate) ids: SharedIdReceiver,
    pub(crate) batches: BatchSender<S::Item>,
    pub(crate) telemetry: Arc<Telemetry>,
}

impl<S: ItemSource> WorkerShared<S> {
    pub fn new(
        source: Arc<S>,
        ids: SharedIdReceiver,
        batches: BatchSender<S::Item>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            source,
            ids,
            batches,
            telemetry,
        }
    }
}

impl<S: ItemSource> Clone for WorkerShared<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            ids: Arc::clone(&self.ids),
            batches: self.batches.clone(),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub fetched: u64,
    pub skipped: u64,
    pub batches: u64,
}

pub struct FetchWorker<S: ItemSource> {
    pub id: usize,
    source: Arc<S>,
    ids: SharedIdReceiver,
    batches: BatchSender<S::Item>,
    batch: Batch<S::Item>,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
}

impl<S: ItemSource> FetchWorker<S> {
    pub fn new(
        id: usize,
        batch_size: usize,
        shutdown: CancellationToken,
        shared: WorkerShared<S>,
    ) -> Self {
        let WorkerShared {
            source,
            ids,
            batches,
            telemetry,
        } = shared;

        Self {
            id,
            source,
            ids,
            batches,
            batch: Batch::new(batch_size),
            shutdown,
            telemetry,
        }
    }

    /// Pulls identifiers until the stream closes or the run is cancelled,
    /// fetching each one and handing full batches to the sink.
    ///
    /// Failed fetches are skipped. Whatever is buffered when the loop ends is
    /// flushed before returning. The worker stops early if the sink is gone.
    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    pub async fn run(mut self) -> WorkerReport {
        tracing::debug!("fetch worker started");
        let mut report = WorkerReport {
            worker: self.id,
            ..WorkerReport::default()
        };

        while let Some(id) = self.next_id().await {
            match self.source.fetch_item(id).await {
                Ok(item) => {
                    report.fetched += 1;
                    self.telemetry.record_fetched();
                    if let Some(full) = self.batch.push(item) {
                        if !self.flush(full, &mut report).await {
                            return report;
                        }
                    }
                }
                Err(err) => {
                    let cause = FailureCause::classify(&err);
                    report.skipped += 1;
                    self.telemetry.record_fetch_failure(cause);
                    tracing::debug!(id, %cause, error = %err, "fetch failed; skipping identifier");
                }
            }
        }

        if let Some(rest) = self.batch.take_remaining() {
            self.flush(rest, &mut report).await;
        }

        report
    }

    async fn next_id(&self) -> Option<u64> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                tracing::debug!("shutdown requested; stopping fetch loop");
                None
            }
            id = async { self.ids.lock().await.recv().await } => id,
        }
    }

    /// Hands `items` to the sink. Returns `false` once the sink has stopped
    /// accepting batches.
    async fn flush(&self, items: Vec<S::Item>, report: &mut WorkerReport) -> bool {
        let count = items.len();
        let first = items.first().map(Item::id);
        if self.batches.send(items).await.is_err() {
            tracing::warn!(count, "batch sink closed; dropping batch");
            return false;
        }

        report.batches += 1;
        self.telemetry.record_batch_flushed();
        tracing::trace!(count, first, "batch handed to sink");
        true
    }
}
