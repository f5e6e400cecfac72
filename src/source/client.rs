//! HTTP client for the xkcd JSON API and the `ItemSource` trait consumed by
//! fetch workers and the orchestrator.

use crate::model::comic::{Comic, ComicInfo};
use crate::model::Item;
use crate::runtime::config::MirrorConfig;
use crate::source::metrics::{FailureCause, SourceMetrics, SourceMetricsSnapshot};
use crate::source::options::SourceClientOptions;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

#[derive(Debug)]
pub enum SourceError {
    Timeout { method: &'static str },
    Status { method: &'static str, status: u16 },
    Decode { method: &'static str, reason: String },
    IdMismatch { requested: u64, received: u64 },
    Transport { method: &'static str, reason: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Timeout { method } => write!(f, "archive request {method} timed out"),
            SourceError::Status { method, status } => {
                write!(f, "archive request {method} returned HTTP {status}")
            }
            SourceError::Decode { method, reason } => {
                write!(f, "archive request {method} returned an invalid payload: {reason}")
            }
            SourceError::IdMismatch {
                requested,
                received,
            } => write!(
                f,
                "archive returned item {received} when item {requested} was requested"
            ),
            SourceError::Transport { method, reason } => {
                write!(f, "archive request {method} failed: {reason}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Remote collection the pipeline mirrors from.
pub trait ItemSource: Send + Sync + 'static {
    type Item: Item;

    /// Fetches a single item by identifier.
    fn fetch_item(&self, id: u64) -> BoxFuture<'_, Result<Self::Item>>;

    /// Highest identifier currently published by the remote collection.
    fn upper_bound(&self) -> BoxFuture<'_, Result<u64>>;
}

#[derive(Debug, Clone)]
pub struct XkcdClient {
    base_url: Arc<str>,
    client: reqwest::Client,
    options: SourceClientOptions,
    metrics: Arc<SourceMetrics>,
}

impl ItemSource for XkcdClient {
    type Item = Comic;

    fn fetch_item(&self, id: u64) -> BoxFuture<'_, Result<Comic>> {
        Box::pin(self.get_comic(id))
    }

    fn upper_bound(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.latest_num())
    }
}

impl XkcdClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, SourceClientOptions::default())
    }

    pub fn with_options(base_url: impl Into<String>, options: SourceClientOptions) -> Result<Self> {
        options.validate()?;

        let base_url = base_url.into();
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!(
                "archive url must start with http:// or https://, got {base_url:?}"
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|err| anyhow!("failed to build archive client: {err}"))?;

        Ok(Self {
            base_url: Arc::from(base_url),
            client,
            options,
            metrics: Arc::new(SourceMetrics::default()),
        })
    }

    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        config.validate()?;
        let options = SourceClientOptions {
            request_timeout: config.request_timeout(),
            pool_max_idle_per_host: std::cmp::max(8, config.worker_count()),
            ..SourceClientOptions::default()
        };
        Self::with_options(config.source_url(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    pub fn metrics(&self) -> SourceMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn get_comic(&self, id: u64) -> Result<Comic> {
        let url = self.comic_url(id);
        let info = self.get_info("get_comic", &url).await?;
        if info.num != id {
            return Err(SourceError::IdMismatch {
                requested: id,
                received: info.num,
            }
            .into());
        }
        Ok(Comic::from(info))
    }

    pub async fn latest_num(&self) -> Result<u64> {
        let url = self.latest_url();
        let info = self.get_info("latest_comic", &url).await?;
        tracing::debug!(latest = info.num, "fetched latest comic number");
        Ok(info.num)
    }

    fn comic_url(&self, id: u64) -> String {
        format!("{}/{id}/info.0.json", self.base_url)
    }

    fn latest_url(&self) -> String {
        format!("{}/info.0.json", self.base_url)
    }

    async fn get_info(&self, method: &'static str, url: &str) -> Result<ComicInfo> {
        let start = Instant::now();
        let result = timeout(self.options.request_timeout, self.request_info(method, url))
            .await
            .map_err(|_| anyhow::Error::from(SourceError::Timeout { method }))
            .and_then(|inner| inner);

        let failure = result.as_ref().err().map(FailureCause::classify);
        self.metrics.record(start.elapsed(), failure);
        result
    }

    async fn request_info(&self, method: &'static str, url: &str) -> Result<ComicInfo> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| map_transport_error(method, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                method,
                status: status.as_u16(),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| map_transport_error(method, err))?;
        serde_json::from_slice(&bytes).map_err(|err| {
            SourceError::Decode {
                method,
                reason: err.to_string(),
            }
            .into()
        })
    }
}

fn map_transport_error(method: &'static str, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        return SourceError::Timeout { method }.into();
    }
    SourceError::Transport {
        method,
        reason: err.to_string(),
    }
    .into()
}
