//! Block location cache with in-flight deduplication and read-ahead.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Result;
use crate::types::{BlockLocation, Fd};

/// Cache of (descriptor, block start) → [`BlockLocation`].
///
/// Each slot is a one-shot initialization cell: the first caller to touch a
/// missing slot runs the metadata fetch, every concurrent caller for the
/// same key awaits that same fetch. At most one lookup RPC is ever
/// outstanding per (fd, block start); on failure the slot stays empty and
/// the next caller retries. Entries live until the descriptor is evicted on
/// close, rename, or delete.
pub struct BlockLocationCache {
    files: Mutex<HashMap<Fd, Arc<FileBlocks>>>,
    stats: CacheStats,
}

struct FileBlocks {
    slots: Mutex<HashMap<u64, Arc<OnceCell<BlockLocation>>>>,
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    prefetches: AtomicU64,
}

impl Default for BlockLocationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockLocationCache {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    fn slot(&self, fd: Fd, block_start: u64) -> Arc<OnceCell<BlockLocation>> {
        let file = {
            let mut files = self.files.lock();
            Arc::clone(files.entry(fd).or_insert_with(|| {
                Arc::new(FileBlocks {
                    slots: Mutex::new(HashMap::new()),
                })
            }))
        };
        let mut slots = file.slots.lock();
        Arc::clone(slots.entry(block_start).or_insert_with(|| Arc::new(OnceCell::new())))
    }

    /// Return the cached location, or resolve it through `fetch`. Concurrent
    /// callers for one key share a single fetch.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        fd: Fd,
        block_start: u64,
        fetch: F,
    ) -> Result<BlockLocation>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BlockLocation>>,
    {
        let slot = self.slot(fd, block_start);
        if let Some(location) = slot.get() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*location);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let location = slot.get_or_try_init(fetch).await?;
        debug!(fd, block = block_start, "block location resolved");
        Ok(*location)
    }

    /// Seed an already-resolved location, e.g. the first block returned by
    /// create/lookup. Loses quietly to a concurrent fetch of the same key;
    /// locations are immutable so both writers carry the same value.
    pub fn put(&self, fd: Fd, block_start: u64, location: BlockLocation) {
        let _ = self.slot(fd, block_start).set(location);
    }

    /// Resolve `fetch` into the slot from a background task, so a later
    /// `get_or_fetch` for the same key finds it resolved or joins it
    /// mid-flight. Failures only log; the foreground path retries.
    ///
    /// Must be called within a tokio runtime.
    pub fn prefetch<F, Fut>(&self, fd: Fd, block_start: u64, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<BlockLocation>> + Send,
    {
        let slot = self.slot(fd, block_start);
        if slot.initialized() {
            return;
        }
        self.stats.prefetches.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            if let Err(e) = slot.get_or_try_init(fetch).await {
                debug!(fd, block = block_start, error = %e, "read-ahead fetch failed");
            }
        });
    }

    /// Drop every cached block of a descriptor.
    pub fn evict(&self, fd: Fd) {
        if self.files.lock().remove(&fd).is_some() {
            debug!(fd, "evicted cached block locations");
        }
    }

    /// Drop everything.
    pub fn purge(&self) {
        self.files.lock().clear();
    }

    pub fn stats(&self) -> BlockCacheSnapshot {
        BlockCacheSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            prefetches: self.stats.prefetches.load(Ordering::Relaxed),
            files: self.files.lock().len() as u64,
        }
    }
}

/// Snapshot of block cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockCacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub prefetches: u64,
    pub files: u64,
}
