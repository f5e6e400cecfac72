//! File-backed store holding the whole collection as one JSON array.
//!
//! The file is loaded once when the store is opened and kept in memory.
//! Every bulk insert rewrites the file through a temp file in the same
//! directory followed by a rename, so readers never observe a half-written
//! collection and a failed write leaves both the file and the in-memory view
//! untouched.

use crate::model::Item;
use crate::store::repository::{Repository, StoreError};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    items: RwLock<BTreeMap<u64, T>>,
    len: AtomicUsize,
}

impl<T: Item> JsonFileStore<T> {
    /// Opens the store at `path`, loading existing contents when the file is
    /// present. A missing file yields an empty, uninitialized store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => decode(&bytes)
                .with_context(|| format!("failed to load store from {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        tracing::debug!(path = %path.display(), items = items.len(), "opened json store");
        let len = items.len();
        Ok(Self {
            path,
            items: RwLock::new(items),
            len: AtomicUsize::new(len),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_batch(&self, batch: Vec<T>) -> Result<()> {
        let mut guard = self.items.write().await;
        let mut next = guard.clone();
        for item in batch {
            next.insert(item.id(), item);
        }

        let records: Vec<&T> = next.values().collect();
        let bytes = serde_json::to_vec_pretty(&records).context("failed to encode store")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .context("store writer task panicked")??;

        self.len.store(next.len(), Ordering::SeqCst);
        *guard = next;
        Ok(())
    }
}

impl<T: Item> Repository<T> for JsonFileStore<T> {
    fn exists(&self) -> bool {
        self.path.is_file()
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
            if items.is_empty() {
                return Ok(());
            }
            let count = items.len();
            self.write_batch(items)
                .await
                .with_context(|| format!("failed to persist {count} items"))
        })
    }
}

fn decode<T: Item>(bytes: &[u8]) -> Result<BTreeMap<u64, T>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    let records: Vec<T> = serde_json::from_slice(bytes).map_err(|err| StoreError::Corrupt {
        reason: err.to_string(),
    })?;
    Ok(records.into_iter().map(|item| (item.id(), item)).collect())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    temp.write_all(data)
        .context("failed to write store temp file")?;
    temp.as_file()
        .sync_all()
        .context("failed to sync store temp file")?;
    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to persist store to {}", path.display()))?;
    Ok(())
}
