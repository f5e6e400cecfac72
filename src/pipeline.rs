//! The acquisition pipeline: gap detection feeds identifiers to a pool of
//! fetch workers, which hand full batches to a single sink that persists
//! them. `mirror` wires the three together for one run.

pub mod batch;
pub mod gaps;
pub(crate) mod lifecycle;
pub mod mirror;
pub mod sink;
pub mod worker;

/// Capacity of the identifier and batch hand-off channels. Tokio channels
/// cannot be zero-sized, so one slot is the closest to a rendezvous.
pub const HANDOFF_CAPACITY: usize = 1;
