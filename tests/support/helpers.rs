use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Result};
use comixsync::{Comic, ComicInfo, Item, ItemSource, MemoryStore, MirrorConfig, Repository};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn comic(id: u64) -> Comic {
    Comic::from(ComicInfo {
        num: id,
        title: format!("Comic {id}"),
        safe_title: format!("Comic {id}"),
        ..ComicInfo::default()
    })
}

pub fn test_config(workers: usize, batch_size: usize) -> Result<MirrorConfig> {
    MirrorConfig::builder()
        .store_path("unused.json")
        .source_url("http://127.0.0.1:9")
        .worker_count(workers)
        .batch_size(batch_size)
        .metrics_interval(Duration::from_millis(50))
        .build()
}

pub fn ids_of(items: &[Comic]) -> Vec<u64> {
    let mut ids: Vec<u64> = items.iter().map(Item::id).collect();
    ids.sort_unstable();
    ids
}

/// In-process source with failure injection and an optional per-fetch delay.
pub struct ScriptedSource {
    bound: u64,
    failing: HashSet<u64>,
    delay: Duration,
    bound_fails: bool,
    fetches: AtomicU64,
}

impl ScriptedSource {
    pub fn new(bound: u64) -> Self {
        Self {
            bound,
            failing: HashSet::new(),
            delay: Duration::ZERO,
            bound_fails: false,
            fetches: AtomicU64::new(0),
        }
    }

    pub fn failing(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(ids);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failing_bound(mut self) -> Self {
        self.bound_fails = true;
        self
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ItemSource for ScriptedSource {
    type Item = Comic;

    fn fetch_item(&self, id: u64) -> BoxFuture<'_, Result<Comic>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.failing.contains(&id) {
                bail!("comic {id} unavailable");
            }
            Ok(comic(id))
        })
    }

    fn upper_bound(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            if self.bound_fails {
                bail!("latest comic unavailable");
            }
            Ok(self.bound)
        })
    }
}

/// Memory store that records every bulk insert and can be told to fail.
pub struct RecordingStore {
    inner: MemoryStore<Comic>,
    inserts: Mutex<Vec<Vec<u64>>>,
    fail_enumeration: AtomicBool,
    /// Inserts accepted before every further insert fails; `usize::MAX` never fails.
    inserts_before_failure: AtomicUsize,
}

impl RecordingStore {
    pub fn new(existing: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner: MemoryStore::with_items(existing.into_iter().map(comic)),
            inserts: Mutex::new(Vec::new()),
            fail_enumeration: AtomicBool::new(false),
            inserts_before_failure: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn fail_enumeration(self) -> Self {
        self.fail_enumeration.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_after_inserts(self, accepted: usize) -> Self {
        self.inserts_before_failure.store(accepted, Ordering::SeqCst);
        self
    }

    /// Identifiers of each accepted bulk insert, in call order.
    pub fn inserts(&self) -> Vec<Vec<u64>> {
        self.inserts.lock().expect("insert log poisoned").clone()
    }

    pub async fn ids(&self) -> Vec<u64> {
        self.inner.ids().await
    }
}

impl Repository<Comic> for RecordingStore {
    fn exists(&self) -> bool {
        true
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn get_all(&self) -> BoxFuture<'_, Result<Vec<Comic>>> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Box::pin(async { Err(anyhow!("store index unreadable")) });
        }
        self.inner.get_all()
    }

    fn get_by_id(&self, id: u64) -> BoxFuture<'_, Result<Comic>> {
        self.inner.get_by_id(id)
    }

    fn bulk_insert(&self, items: Vec<Comic>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let accepted = self
                .inserts_before_failure
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    if left == usize::MAX {
                        Some(left)
                    } else {
                        left.checked_sub(1)
                    }
                })
                .is_ok();
            if !accepted {
                bail!("disk full");
            }

            let ids: Vec<u64> = items.iter().map(Item::id).collect();
            self.inner.bulk_insert(items).await?;
            self.inserts.lock().expect("insert log poisoned").push(ids);
            Ok(())
        })
    }
}

pub async fn wait_for_size<R: Repository<Comic>>(
    store: &R,
    target: usize,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if store.size() >= target {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("store size {} did not reach {target} within {timeout:?}", store.size());
        }
        sleep(Duration::from_millis(10)).await;
    }
}
