//! Pooled allocation of native buffers.
//!
//! The pool recycles fixed-size buffers through a free queue. In mapped mode
//! it grows by mapping whole regions and slicing them into buffers, so a
//! region's worth of allocations costs one mmap; once the configured limit is
//! reached (or in heap mode) further misses fall back to direct heap buffers,
//! which still recycle through the same queue.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BufferCheckout, NativeBuffer, Region};
use crate::config::BufferConfig;
use crate::error::{Result, TierFsError};

/// Pool of fixed-size native buffers, safe for concurrent use.
pub struct BufferPool {
    config: BufferConfig,
    /// Free buffers ready for checkout.
    free: Mutex<VecDeque<NativeBuffer>>,
    /// Count of mapped regions created; the lock serializes growth so
    /// concurrent misses map at most one region.
    grow: Mutex<usize>,
    /// Unique directory holding this pool's region files, mapped mode only.
    pool_dir: Option<PathBuf>,
    checkout: BufferCheckout,
    stats: PoolStats,
    closed: AtomicBool,
}

struct PoolStats {
    allocations: AtomicU64,
    releases: AtomicU64,
    misses: AtomicU64,
    in_use: AtomicU64,
    peak_in_use: AtomicU64,
    mapped_regions: AtomicU64,
}

impl BufferPool {
    pub fn new(config: &BufferConfig) -> Result<Self> {
        let pool_dir = if config.pool_limit > 0 {
            let dir = config.cache_dir.join(format!("pool-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&dir)?;
            Some(dir)
        } else {
            None
        };

        Ok(Self {
            config: config.clone(),
            free: Mutex::new(VecDeque::new()),
            grow: Mutex::new(0),
            pool_dir,
            checkout: BufferCheckout::new(),
            stats: PoolStats {
                allocations: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                in_use: AtomicU64::new(0),
                peak_in_use: AtomicU64::new(0),
                mapped_regions: AtomicU64::new(0),
            },
            closed: AtomicBool::new(false),
        })
    }

    /// Hand out a cleared buffer. The buffer must come back through
    /// [`BufferPool::free`] exactly once.
    pub fn allocate(&self) -> Result<NativeBuffer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TierFsError::FsClosed);
        }

        // Bound the guard to the pop alone; the miss path takes this lock
        // again while refilling the queue.
        let recycled = self.free.lock().pop_front();
        let buffer = match recycled {
            Some(buffer) => buffer,
            None => self.allocate_slow()?,
        };

        self.checkout.check_in(buffer.address())?;
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        let in_use = self.stats.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        self.stats.peak_in_use.fetch_max(in_use, Ordering::Relaxed);
        Ok(buffer)
    }

    /// Miss path: grow by one mapped region if the limit allows, otherwise
    /// fall back to a direct heap buffer.
    fn allocate_slow(&self) -> Result<NativeBuffer> {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let mut regions = self.grow.lock();

        // A concurrent grower may have refilled the queue while this caller
        // waited on the lock.
        if let Some(buffer) = self.free.lock().pop_front() {
            return Ok(buffer);
        }

        let region_size = self.config.region_size as usize;
        let max_regions = (self.config.pool_limit / self.config.region_size.max(1)) as usize;

        if let Some(dir) = &self.pool_dir {
            if *regions < max_regions {
                let path = dir.join(format!("region-{}", *regions));
                let region = Arc::new(Region::mapped(&path, region_size)?);
                *regions += 1;
                self.stats.mapped_regions.fetch_add(1, Ordering::Relaxed);

                let per_region = region_size / self.config.buffer_size;
                let first = NativeBuffer::from_region(Arc::clone(&region), 0, self.config.buffer_size);
                let mut free = self.free.lock();
                for i in 1..per_region {
                    free.push_back(NativeBuffer::from_region(
                        Arc::clone(&region),
                        i * self.config.buffer_size,
                        self.config.buffer_size,
                    ));
                }
                return Ok(first);
            }
        }

        debug!(size = self.config.buffer_size, "pool limit reached, direct heap buffer");
        let region = Arc::new(Region::heap(self.config.buffer_size));
        Ok(NativeBuffer::from_region(region, 0, self.config.buffer_size))
    }

    /// Return a buffer. Freeing a buffer twice is a caller error.
    pub fn free(&self, mut buffer: NativeBuffer) -> Result<()> {
        self.checkout.check_out(buffer.address())?;
        self.stats.releases.fetch_add(1, Ordering::Relaxed);
        self.stats.in_use.fetch_sub(1, Ordering::Relaxed);

        if self.closed.load(Ordering::Acquire) {
            // Late return after shutdown; let the region unmap.
            return Ok(());
        }
        buffer.clear();
        self.free.lock().push_back(buffer);
        Ok(())
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            allocations: self.stats.allocations.load(Ordering::Relaxed),
            releases: self.stats.releases.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            in_use: self.stats.in_use.load(Ordering::Relaxed),
            peak_in_use: self.stats.peak_in_use.load(Ordering::Relaxed),
            mapped_regions: self.stats.mapped_regions.load(Ordering::Relaxed),
            free_buffers: self.free.lock().len() as u64,
            buffer_size: self.config.buffer_size,
        }
    }

    /// Drop every pooled buffer and remove the region directory. Buffers
    /// still checked out keep their regions mapped until they drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let outstanding = self.checkout.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "closing buffer pool with buffers still checked out");
        }
        self.free.lock().clear();
        if let Some(dir) = &self.pool_dir {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                debug!(dir = %dir.display(), error = %e, "pool directory not fully removed");
            }
        }
        info!(outstanding, "buffer pool closed");
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Snapshot of pool statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    pub allocations: u64,
    pub releases: u64,
    pub misses: u64,
    pub in_use: u64,
    pub peak_in_use: u64,
    pub mapped_regions: u64,
    pub free_buffers: u64,
    pub buffer_size: usize,
}
