//! TOML configuration file plus `COMIXSYNC_*` environment overrides.
//!
//! Layers, lowest precedence first: the file, the environment, then
//! [`ConfigOverrides`] from the command line.

use crate::runtime::config::MirrorConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SOURCE_URL: &str = "https://xkcd.com";

const ENV_STORE_PATH: &str = "COMIXSYNC_STORE_PATH";
const ENV_SOURCE_URL: &str = "COMIXSYNC_SOURCE_URL";
const ENV_WORKERS: &str = "COMIXSYNC_WORKERS";
const ENV_BATCH_SIZE: &str = "COMIXSYNC_BATCH_SIZE";

/// Values given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub worker_count: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub store_path: Option<PathBuf>,
    pub source_url: Option<String>,
    pub worker_count: Option<usize>,
    pub batch_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub metrics_interval_secs: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads `explicit`, or [`DEFAULT_CONFIG_PATH`] when none is given, then
    /// layers the process environment and `overrides` on top.
    ///
    /// An explicit path must exist. A missing file at the default path yields
    /// an empty file, so the environment and flags can supply every value.
    pub fn resolve(explicit: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        Self::resolve_from(
            explicit,
            Path::new(DEFAULT_CONFIG_PATH),
            overrides,
            |key| std::env::var(key).ok(),
        )
    }

    fn resolve_from(
        explicit: Option<&Path>,
        default_path: &Path,
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut file = match explicit {
            Some(path) => Self::load(path)?,
            None if default_path.is_file() => Self::load(default_path)?,
            None => {
                tracing::debug!(
                    path = %default_path.display(),
                    "no configuration file; using environment"
                );
                Self::default()
            }
        };

        file.apply_overrides_from(lookup);
        file.apply_cli_overrides(overrides);
        Ok(file)
    }

    fn apply_cli_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(count) = overrides.worker_count {
            self.worker_count = Some(count);
        }
        if let Some(size) = overrides.batch_size {
            self.batch_size = Some(size);
        }
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = non_blank(lookup(ENV_STORE_PATH)) {
            self.store_path = Some(PathBuf::from(value));
        }

        if let Some(value) = non_blank(lookup(ENV_SOURCE_URL)) {
            self.source_url = Some(value);
        }

        if let Some(value) = non_blank(lookup(ENV_WORKERS)) {
            match value.parse::<usize>() {
                Ok(count) => self.worker_count = Some(count),
                Err(err) => tracing::warn!("invalid {ENV_WORKERS}, ignoring: {err}"),
            }
        }

        if let Some(value) = non_blank(lookup(ENV_BATCH_SIZE)) {
            match value.parse::<usize>() {
                Ok(size) => self.batch_size = Some(size),
                Err(err) => tracing::warn!("invalid {ENV_BATCH_SIZE}, ignoring: {err}"),
            }
        }
    }

    pub fn into_config(self) -> Result<MirrorConfig> {
        let mut builder = MirrorConfig::builder()
            .source_url(
                self.source_url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_owned()),
            );

        if let Some(path) = self.store_path {
            builder = builder.store_path(path);
        }
        if let Some(count) = self.worker_count {
            builder = builder.worker_count(count);
        }
        if let Some(size) = self.batch_size {
            builder = builder.batch_size(size);
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.metrics_interval_secs {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }

        builder.build()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}
