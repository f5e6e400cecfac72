use crate::pipeline::mirror::{Mirror, RunReport};
use crate::runtime::config::MirrorConfig;
use crate::runtime::state::PipelineState;
use crate::source::ItemSource;
use crate::store::Repository;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Drives mirror runs and handles OS signals for graceful shutdowns.
pub struct Runner<S, R>
where
    S: ItemSource,
    R: Repository<S::Item>,
{
    mirror: Mirror<S, R>,
    shutdown: CancellationToken,
}

impl<S, R> Runner<S, R>
where
    S: ItemSource,
    R: Repository<S::Item>,
{
    pub fn new(config: &MirrorConfig, source: Arc<S>, repo: Arc<R>) -> Self {
        Self {
            mirror: Mirror::new(config, source, repo),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.mirror.state()
    }

    pub fn mirror(&self) -> &Mirror<S, R> {
        &self.mirror
    }

    /// Performs one run, cancellable through [`Runner::cancellation_token`].
    pub async fn run(&mut self) -> Result<RunReport> {
        let shutdown = self.shutdown.clone();
        let result = self.mirror.run(&shutdown).await;
        self.reinitialize_shutdown_token();
        result
    }

    /// Performs one run, cancelling it on Ctrl-C (SIGINT). Items fetched before
    /// the signal are still persisted.
    pub async fn run_until_ctrl_c(&mut self) -> Result<RunReport> {
        let shutdown = self.shutdown.clone();
        let result = {
            let run = self.mirror.run(&shutdown);
            tokio::pin!(run);

            tokio::select! {
                result = &mut run => result,
                signal = signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("Ctrl-C received; cancelling mirror run");
                            shutdown.cancel();
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to listen for Ctrl-C; run continues");
                        }
                    }
                    run.await
                }
            }
        };

        self.reinitialize_shutdown_token();
        result
    }

    fn reinitialize_shutdown_token(&mut self) {
        if self.shutdown.is_cancelled() {
            self.shutdown = CancellationToken::new();
        }
    }
}
