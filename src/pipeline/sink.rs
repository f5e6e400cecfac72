use crate::model::Item;
use crate::runtime::telemetry::Telemetry;
use crate::store::Repository;
use anyhow::{Context, Result};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub batches: u64,
    pub persisted: u64,
}

/// Single consumer that persists batches in arrival order.
pub struct BatchSink<T, R> {
    repo: Arc<R>,
    batches: mpsc::Receiver<Vec<T>>,
    telemetry: Arc<Telemetry>,
    _item: PhantomData<fn() -> T>,
}

impl<T, R> BatchSink<T, R>
where
    T: Item,
    R: Repository<T>,
{
    pub fn new(repo: Arc<R>, batches: mpsc::Receiver<Vec<T>>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            repo,
            batches,
            telemetry,
            _item: PhantomData,
        }
    }

    /// Persists batches until every producer has dropped its sender.
    ///
    /// Cancellation is not observed here: batches flushed by workers during
    /// shutdown are still written. The first failed insert ends the run with
    /// an error and closes the batch stream.
    pub async fn run(mut self) -> Result<SinkReport> {
        let mut report = SinkReport::default();

        while let Some(batch) = self.batches.recv().await {
            let count = batch.len() as u64;
            self.repo
                .bulk_insert(batch)
                .await
                .with_context(|| format!("bulk insert of {count} items failed"))?;

            report.batches += 1;
            report.persisted += count;
            self.telemetry.record_persisted(count);
            tracing::debug!(count, total = report.persisted, "batch persisted");
        }

        tracing::debug!(
            batches = report.batches,
            persisted = report.persisted,
            "batch stream closed"
        );
        Ok(report)
    }
}
