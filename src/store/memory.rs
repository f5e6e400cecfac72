use crate::model::Item;
use crate::store::repository::{Repository, StoreError};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process store keyed by identifier. Always initialized.
#[derive(Debug)]
pub struct MemoryStore<T> {
    items: RwLock<BTreeMap<u64, T>>,
    len: AtomicUsize,
}

impl<T: Item> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> MemoryStore<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let items: BTreeMap<u64, T> = items.into_iter().map(|item| (item.id(), item)).collect();
        let len = items.len();
        Self {
            items: RwLock::new(items),
            len: AtomicUsize::new(len),
        }
    }

    /// Identifiers currently stored, ascending.
    pub async fn ids(&self) -> Vec<u64> {
        self.items.read().await.keys().copied().collect()
    }
}

impl<T: Item> Repository<T> for MemoryStore<T> {
    fn exists(&self) -> bool {
        true
    }

    fn size(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    fn get_all(&self) -> BoxFuture<'_, Result<Vec<T>>> {
        Box::pin(async move { Ok(self.items.read().await.values().cloned().collect()) })
    }

    fn get_by_id(&self, id: u64) -> BoxFuture<'_, Result<T>> {
        Box::pin(async move {
            self.items
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { id }.into())
        })
    }

    fn bulk_insert(&self, items: Vec<T>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut guard = self.items.write().await;
            for item in items {
                guard.insert(item.id(), item);
            }
            self.len.store(guard.len(), Ordering::SeqCst);
            Ok(())
        })
    }
}
