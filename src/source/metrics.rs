//! Failure classification for archive fetches.
//!
//! Every failed fetch is bucketed by [`FailureCause`], derived from the
//! [`SourceError`] in the error chain. The client keeps one set of buckets for
//! all its requests; the pipeline keeps another for the fetches it skipped,
//! which ends up in the run report.

use crate::source::client::SourceError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const CAUSE_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    /// HTTP 404: the archive has no item under that number.
    NotFound,
    /// HTTP 5xx.
    ServerError,
    /// Any other non-success status.
    OtherStatus,
    Timeout,
    /// The payload was not valid JSON for the item type.
    Decode,
    /// The archive answered with a different item than requested.
    IdMismatch,
    /// Connection level failures (refused, reset, DNS).
    Transport,
    /// Errors not raised by the archive client.
    Other,
}

impl FailureCause {
    pub const ALL: [FailureCause; CAUSE_COUNT] = [
        FailureCause::NotFound,
        FailureCause::ServerError,
        FailureCause::OtherStatus,
        FailureCause::Timeout,
        FailureCause::Decode,
        FailureCause::IdMismatch,
        FailureCause::Transport,
        FailureCause::Other,
    ];

    /// Classifies the first [`SourceError`] found in the chain of `err`.
    pub fn classify(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<SourceError>())
            .map_or(FailureCause::Other, Self::from_source_error)
    }

    fn from_source_error(err: &SourceError) -> Self {
        match err {
            SourceError::Status { status: 404, .. } => FailureCause::NotFound,
            SourceError::Status { status, .. } if (500..600).contains(status) => {
                FailureCause::ServerError
            }
            SourceError::Status { .. } => FailureCause::OtherStatus,
            SourceError::Timeout { .. } => FailureCause::Timeout,
            SourceError::Decode { .. } => FailureCause::Decode,
            SourceError::IdMismatch { .. } => FailureCause::IdMismatch,
            SourceError::Transport { .. } => FailureCause::Transport,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCause::NotFound => "not_found",
            FailureCause::ServerError => "server_error",
            FailureCause::OtherStatus => "other_status",
            FailureCause::Timeout => "timeout",
            FailureCause::Decode => "decode",
            FailureCause::IdMismatch => "id_mismatch",
            FailureCause::Transport => "transport",
            FailureCause::Other => "other",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure counts per cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureBreakdown {
    counts: [u64; CAUSE_COUNT],
}

impl FailureBreakdown {
    pub fn get(&self, cause: FailureCause) -> u64 {
        self.counts[cause.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Causes with at least one failure, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (FailureCause, u64)> + '_ {
        FailureCause::ALL
            .into_iter()
            .map(|cause| (cause, self.get(cause)))
            .filter(|(_, count)| *count > 0)
    }
}

/// Renders as `not_found=1 server_error=2`, or `none`.
impl fmt::Display for FailureBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for (cause, count) in self.iter() {
            if wrote {
                f.write_str(" ")?;
            }
            write!(f, "{cause}={count}")?;
            wrote = true;
        }
        if !wrote {
            f.write_str("none")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FailureCounters {
    counts: [AtomicU64; CAUSE_COUNT],
}

impl FailureCounters {
    pub(crate) fn record(&self, cause: FailureCause) {
        self.counts[cause.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FailureBreakdown {
        let mut breakdown = FailureBreakdown::default();
        for (slot, counter) in breakdown.counts.iter_mut().zip(&self.counts) {
            *slot = counter.load(Ordering::Relaxed);
        }
        breakdown
    }
}

/// Per-client request accounting.
#[derive(Debug, Default)]
pub(crate) struct SourceMetrics {
    requests: AtomicU64,
    latency_ns: AtomicU64,
    failures: FailureCounters,
}

impl SourceMetrics {
    pub(crate) fn record(&self, latency: Duration, failure: Option<FailureCause>) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_ns.fetch_add(
            u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        if let Some(cause) = failure {
            self.failures.record(cause);
        }
    }

    pub(crate) fn snapshot(&self) -> SourceMetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let latency_ns = self.latency_ns.load(Ordering::Relaxed);
        let average_latency = if requests == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(latency_ns / requests)
        };

        SourceMetricsSnapshot {
            requests,
            average_latency,
            failures: self.failures.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetricsSnapshot {
    pub requests: u64,
    pub average_latency: Duration,
    pub failures: FailureBreakdown,
}

impl SourceMetricsSnapshot {
    pub fn succeeded(&self) -> u64 {
        self.requests.saturating_sub(self.failures.total())
    }
}
