use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration for the mirror pipeline.
///
/// All instances must be constructed via [`MirrorConfig::builder`] or [`MirrorConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    store_path: PathBuf,
    source_url: String,
    worker_count: usize,
    batch_size: usize,
    request_timeout: Duration,
    metrics_interval: Duration,
}

pub struct MirrorConfigParams {
    pub store_path: PathBuf,
    pub source_url: String,
    pub worker_count: usize,
    pub batch_size: usize,
    pub request_timeout: Duration,
    pub metrics_interval: Duration,
}

impl MirrorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`MirrorConfig::builder`] when many values use defaults.
    pub fn new(params: MirrorConfigParams) -> Result<Self> {
        let MirrorConfigParams {
            store_path,
            source_url,
            worker_count,
            batch_size,
            request_timeout,
            metrics_interval,
        } = params;

        let config = Self {
            store_path,
            source_url: source_url.trim().to_owned(),
            worker_count,
            batch_size,
            request_timeout,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Location of the local store file.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Base URL of the remote archive (scheme included).
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Number of concurrent fetch workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Maximum number of items a worker accumulates before flushing.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Per-request timeout applied by the archive client.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.store_path.as_os_str().is_empty() {
            bail!("store_path cannot be empty");
        }

        validate_url(&self.source_url)?;

        if self.worker_count == 0 {
            bail!("worker_count must be greater than 0");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MirrorConfigBuilder {
    store_path: Option<PathBuf>,
    source_url: Option<String>,
    worker_count: Option<usize>,
    batch_size: Option<usize>,
    request_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl MirrorConfigBuilder {
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<MirrorConfig> {
        let params = MirrorConfigParams {
            store_path: self.store_path.context("store_path is required")?,
            source_url: self.source_url.context("source_url is required")?,
            worker_count: self.worker_count.context("worker_count is required")?,
            batch_size: self.batch_size.context("batch_size is required")?,
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        MirrorConfig::new(params)
    }
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("source_url must start with http:// or https://");
    }
    Ok(())
}
