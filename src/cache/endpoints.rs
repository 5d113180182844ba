//! Per-tier cache of storage node connections.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, TierFsError};
use crate::storage::{StorageEndpoint, StorageTransport};
use crate::types::{NodeInfo, StorageTier};

/// Caches one open [`StorageEndpoint`] per storage node per tier.
///
/// Lookup is a plain map read. On miss, a per-key async lock bounds
/// connection attempts to exactly one per node: concurrent first-touches of
/// one node queue on its lock, re-check the map once they hold it, and find
/// the winner's endpoint published. First-touches of distinct nodes never
/// block each other. Endpoints live until [`EndpointCache::close`].
pub struct EndpointCache {
    tiers: HashMap<StorageTier, TierCache>,
    stats: CacheStats,
    closed: AtomicBool,
}

/// Sub-cache for one storage tier.
struct TierCache {
    transport: Arc<dyn StorageTransport>,
    endpoints: Mutex<HashMap<u64, Arc<dyn StorageEndpoint>>>,
    /// Per-node connect locks, created on demand and kept for reuse.
    locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    connects: AtomicU64,
}

impl EndpointCache {
    /// Build the cache over a tier → transport registry. Tiers absent from
    /// the registry are unreachable; `get` for them is a typed error.
    pub fn new(transports: HashMap<StorageTier, Arc<dyn StorageTransport>>) -> Self {
        let tiers = transports
            .into_iter()
            .map(|(tier, transport)| {
                (
                    tier,
                    TierCache {
                        transport,
                        endpoints: Mutex::new(HashMap::new()),
                        locks: Mutex::new(HashMap::new()),
                    },
                )
            })
            .collect();
        Self {
            tiers,
            stats: CacheStats::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// The endpoint for `node`, connecting on first touch.
    pub async fn get(&self, node: &NodeInfo) -> Result<Arc<dyn StorageEndpoint>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TierFsError::FsClosed);
        }
        let tier = self
            .tiers
            .get(&node.tier)
            .ok_or_else(|| TierFsError::UnknownTier(node.tier.to_string()))?;
        let key = node.key();

        if let Some(endpoint) = tier.endpoints.lock().get(&key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(endpoint));
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let lock = {
            let mut locks = tier.locks.lock();
            Arc::clone(locks.entry(key).or_default())
        };
        let _guard = lock.lock().await;

        // The connect race is decided; the loser finds the winner's endpoint.
        if let Some(endpoint) = tier.endpoints.lock().get(&key) {
            return Ok(Arc::clone(endpoint));
        }

        let endpoint = tier.transport.connect(node).await?;
        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        debug!(tier = %node.tier, addr = %node.addr, "connected storage endpoint");

        // close() may have drained the maps while the connect was in
        // flight; publishing now would leak the connection. The flag is
        // re-read under the map lock: close() sets it before draining, so
        // either the flag is visible here or the drain sees this entry.
        {
            let mut endpoints = tier.endpoints.lock();
            if !self.closed.load(Ordering::Acquire) {
                endpoints.insert(key, Arc::clone(&endpoint));
                return Ok(endpoint);
            }
        }
        let _ = endpoint.close().await;
        Err(TierFsError::FsClosed)
    }

    /// Close every cached endpoint across every tier. Idempotent; reports
    /// the first close failure after attempting them all.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_err = None;
        let mut torn_down = 0usize;
        for tier in self.tiers.values() {
            let endpoints: Vec<_> = tier.endpoints.lock().drain().map(|(_, e)| e).collect();
            for endpoint in endpoints {
                torn_down += 1;
                if let Err(e) = endpoint.close().await {
                    first_err.get_or_insert(e);
                }
            }
            tier.locks.lock().clear();
        }
        info!(endpoints = torn_down, "endpoint cache closed");
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    pub fn stats(&self) -> EndpointCacheSnapshot {
        EndpointCacheSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            connects: self.stats.connects.load(Ordering::Relaxed),
            endpoints: self
                .tiers
                .values()
                .map(|t| t.endpoints.lock().len() as u64)
                .sum(),
        }
    }
}

/// Snapshot of endpoint cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub connects: u64,
    pub endpoints: u64,
}
