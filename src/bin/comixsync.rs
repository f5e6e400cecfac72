//! Mirrors the xkcd archive into a local JSON store.

use anyhow::{Context, Result};
use clap::Parser;
use comixsync::{
    init_tracing, Comic, ConfigFile, ConfigOverrides, JsonFileStore, PipelineState, Runner,
    XkcdClient,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "comixsync", version, about = "Incrementally mirror a numbered comic archive")]
struct Args {
    /// Path to the TOML configuration file.
    ///
    /// A missing file at the default location is not an error; values then
    /// come from `COMIXSYNC_*` environment variables and flags.
    #[arg(short, long, env = "COMIXSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent fetch workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Items accumulated per worker before a batch is persisted.
    #[arg(long)]
    batch_size: Option<usize>,
}

async fn run(args: Args) -> Result<PipelineState> {
    let overrides = ConfigOverrides {
        worker_count: args.workers,
        batch_size: args.batch_size,
    };
    let config = ConfigFile::resolve(args.config.as_deref(), overrides)?
        .into_config()
        .context("invalid configuration")?;

    let store = JsonFileStore::<Comic>::open(config.store_path()).await?;
    let client = XkcdClient::from_config(&config)?;
    tracing::info!(
        store = %store.path().display(),
        source = client.endpoint(),
        "configuration loaded"
    );

    let client = Arc::new(client);
    let mut runner = Runner::new(&config, Arc::clone(&client), Arc::new(store));
    let report = runner.run_until_ctrl_c().await?;

    let metrics = client.metrics();
    tracing::info!(
        state = %report.state,
        persisted = report.persisted,
        skipped = report.skipped,
        requests = metrics.requests,
        failures = %metrics.failures,
        avg_latency_ms = metrics.average_latency.as_millis() as u64,
        "sync complete"
    );
    if report.state == PipelineState::Cancelled {
        tracing::info!("sync cancelled; progress so far is persisted");
    }
    Ok(report.state)
}

/// Cancellation is a clean stop; only fatal errors fail the process.
fn exit_status(result: &Result<PipelineState>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let result = run(args).await;
    if let Err(err) = &result {
        tracing::error!(error = ?err, "comixsync failed");
        eprintln!("error: {err:#}");
    }
    ExitCode::from(exit_status(&result))
}
