use crate::model::Item;
use anyhow::Result;
use futures::future::BoxFuture;

#[derive(Debug)]
pub enum StoreError {
    NotFound { id: u64 },
    Corrupt { reason: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound { id } => write!(f, "item {id} is not in the store"),
            StoreError::Corrupt { reason } => write!(f, "store contents are corrupt: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Capability set a local store offers to the mirror pipeline.
///
/// The pipeline only calls [`Repository::get_all`] (gap detection) and
/// [`Repository::bulk_insert`] (batch sink); the rest is for callers that
/// inspect the mirror. `bulk_insert` is the single write path and must keep
/// at most one record per identifier.
pub trait Repository<T: Item>: Send + Sync + 'static {
    /// Whether the backing storage has been initialized.
    fn exists(&self) -> bool;

    /// Number of records currently held.
    fn size(&self) -> usize;

    fn get_all(&self) -> BoxFuture<'_, Result<Vec<T>>>;

    /// Looks up one record; fails with [`StoreError::NotFound`] when absent.
    fn get_by_id(&self, id: u64) -> BoxFuture<'_, Result<T>>;

    /// Writes a batch atomically as the store defines atomicity.
    fn bulk_insert(&self, items: Vec<T>) -> BoxFuture<'_, Result<()>>;
}
