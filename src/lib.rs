pub mod model;
pub mod pipeline;
pub mod runtime;
pub mod source;
pub mod store;

pub use model::comic::{Comic, ComicInfo};
pub use model::Item;
pub use pipeline::batch::Batch;
pub use pipeline::gaps::{missing_ids, GapDetector, GapOutcome, GapStatus};
pub use pipeline::mirror::{Mirror, RunReport};
pub use pipeline::sink::{BatchSink, SinkReport};
pub use pipeline::worker::{FetchWorker, WorkerReport, WorkerShared};
pub use runtime::config::{MirrorConfig, MirrorConfigBuilder, MirrorConfigParams};
pub use runtime::file::{ConfigFile, ConfigOverrides};
pub use runtime::runner::Runner;
pub use runtime::state::PipelineState;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use source::{
    FailureBreakdown, FailureCause, ItemSource, SourceClientOptions, SourceError,
    SourceMetricsSnapshot, XkcdClient,
};
pub use store::{JsonFileStore, MemoryStore, Repository, StoreError};
