use std::fmt;
use tokio::sync::watch;

/// Lifecycle of a single mirror run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    FetchingBound,
    Streaming,
    Draining,
    Done,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Failed | PipelineState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::FetchingBound => "fetching_bound",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
            PipelineState::Cancelled => "cancelled",
        }
    }

    fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, FetchingBound)
                | (FetchingBound, Streaming | Failed | Cancelled)
                | (Streaming, Draining | Failed | Cancelled)
                | (Draining, Done | Failed | Cancelled)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes state transitions to any number of watchers.
#[derive(Debug)]
pub(crate) struct StateTracker {
    tx: watch::Sender<PipelineState>,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(PipelineState::Init);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub(crate) fn current(&self) -> PipelineState {
        *self.tx.borrow()
    }

    /// Moves to `next` when the transition is legal. Illegal transitions are
    /// logged and ignored; the return value reports which happened.
    pub(crate) fn transition(&self, next: PipelineState) -> bool {
        let mut applied = false;
        let mut previous = next;
        self.tx.send_if_modified(|state| {
            previous = *state;
            if state.can_transition_to(next) {
                *state = next;
                applied = true;
            }
            applied
        });

        if applied {
            tracing::debug!(from = %previous, to = %next, "pipeline state changed");
        } else {
            tracing::warn!(from = %previous, to = %next, "ignoring invalid pipeline state transition");
        }
        applied
    }

    /// Returns to `Init` so the owning mirror can run again.
    pub(crate) fn reset(&self) {
        self.tx.send_replace(PipelineState::Init);
    }
}
