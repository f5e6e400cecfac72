//! Gap detection: diff the store against `[1, upper_bound]` and stream the
//! missing identifiers to the workers.

use crate::model::Item;
use crate::runtime::telemetry::Telemetry;
use crate::store::Repository;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identifiers in `[1, upper_bound]` absent from `existing`, ascending.
pub fn missing_ids(existing: &HashSet<u64>, upper_bound: u64) -> impl Iterator<Item = u64> + '_ {
    (1..=upper_bound).filter(move |id| !existing.contains(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapStatus {
    /// Every missing identifier was handed to a worker.
    Completed,
    /// The run was cancelled before the scan finished.
    Cancelled,
    /// All workers went away before the scan finished.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapOutcome {
    pub status: GapStatus,
    /// Missing identifiers found in range.
    pub missing: u64,
    /// Identifiers actually handed to workers.
    pub emitted: u64,
}

pub struct GapDetector<T, R> {
    repo: Arc<R>,
    upper_bound: u64,
    ids_tx: mpsc::Sender<u64>,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
    _item: PhantomData<fn() -> T>,
}

impl<T, R> GapDetector<T, R>
where
    T: Item,
    R: Repository<T>,
{
    pub fn new(
        repo: Arc<R>,
        upper_bound: u64,
        ids_tx: mpsc::Sender<u64>,
        shutdown: CancellationToken,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            repo,
            upper_bound,
            ids_tx,
            shutdown,
            telemetry,
            _item: PhantomData,
        }
    }

    /// Enumerates the store and streams every missing identifier.
    ///
    /// The identifier stream is closed when this returns, whatever the
    /// outcome. A failed enumeration is returned as an error before anything
    /// is emitted.
    pub async fn run(self) -> Result<GapOutcome> {
        let existing = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                tracing::info!("gap detection cancelled before store enumeration");
                return Ok(GapOutcome {
                    status: GapStatus::Cancelled,
                    missing: 0,
                    emitted: 0,
                });
            }
            existing = self.repo.get_all() => existing.context("failed to enumerate stored items")?,
        };

        let known: HashSet<u64> = existing.iter().map(Item::id).collect();
        drop(existing);

        let present_in_range = known
            .iter()
            .filter(|id| (1..=self.upper_bound).contains(*id))
            .count() as u64;
        let missing = self.upper_bound.saturating_sub(present_in_range);
        tracing::info!(
            upper_bound = self.upper_bound,
            stored = known.len(),
            missing,
            "computed missing identifiers"
        );

        let mut emitted = 0u64;
        for id in missing_ids(&known, self.upper_bound) {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!(emitted, missing, "gap detection cancelled");
                    return Ok(GapOutcome { status: GapStatus::Cancelled, missing, emitted });
                }
                sent = self.ids_tx.send(id) => {
                    if sent.is_err() {
                        tracing::warn!(emitted, missing, "all workers stopped; abandoning gap scan");
                        return Ok(GapOutcome { status: GapStatus::Abandoned, missing, emitted });
                    }
                    emitted += 1;
                    self.telemetry.record_id_emitted();
                }
            }
        }

        tracing::debug!(emitted, "gap detection finished");
        Ok(GapOutcome {
            status: GapStatus::Completed,
            missing,
            emitted,
        })
    }
}
