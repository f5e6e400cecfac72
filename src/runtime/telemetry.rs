use crate::source::metrics::{FailureBreakdown, FailureCause, FailureCounters};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by every pipeline component of a run.
#[derive(Default, Debug)]
pub struct Telemetry {
    ids_emitted: AtomicU64,
    items_fetched: AtomicU64,
    fetch_failures: FailureCounters,
    batches_flushed: AtomicU64,
    items_persisted: AtomicU64,
}

impl Telemetry {
    pub fn record_id_emitted(&self) {
        self.ids_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self) {
        self.items_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self, cause: FailureCause) {
        self.fetch_failures.record(cause);
    }

    pub fn record_batch_flushed(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.items_persisted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ids_emitted: self.ids_emitted.load(Ordering::Relaxed),
            items_fetched: self.items_fetched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.snapshot(),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            items_persisted: self.items_persisted.load(Ordering::Relaxed),
        }
    }

    pub fn fetch_failures(&self) -> FailureBreakdown {
        self.fetch_failures.snapshot()
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub ids_emitted: u64,
    pub items_fetched: u64,
    pub fetch_failures: FailureBreakdown,
    pub batches_flushed: u64,
    pub items_persisted: u64,
}

/// Spawns a background task that periodically logs fetch throughput and
/// pipeline counters until `shutdown` is cancelled.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "comixsync::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let fetched_delta = current
                        .items_fetched
                        .saturating_sub(last_snapshot.items_fetched);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        fetched_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "comixsync::metrics",
                        throughput = format!("{throughput:.2}"),
                        emitted = current.ids_emitted,
                        fetched = current.items_fetched,
                        skipped = current.fetch_failures.total(),
                        batches = current.batches_flushed,
                        persisted = current.items_persisted,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
