//! Remote archive plumbing: the `ItemSource` seam consumed by the pipeline,
//! the HTTP client for the xkcd JSON API, failure classification, and client
//! knobs.

pub mod client;
pub mod metrics;
pub mod options;

pub use client::{ItemSource, SourceError, XkcdClient};
pub use metrics::{FailureBreakdown, FailureCause, SourceMetricsSnapshot};
pub use options::SourceClientOptions;
