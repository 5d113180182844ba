//! Client facade tying the data path together.
//!
//! A [`TierFs`] owns the buffer pool, the block and endpoint caches and the
//! metadata connection (or router over several partitions). It is an
//! explicit, owned handle: clone it to share one physical client across
//! tasks, pass it where it is needed, close it when done. Namespace
//! operations resolve paths to [`FileNode`]s, which open the streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::buffer::{BufferCheckout, BufferPool, NativeBuffer, PoolStatsSnapshot};
use crate::cache::{
    BlockCacheSnapshot, BlockLocationCache, EndpointCache, EndpointCacheSnapshot,
};
use crate::config::FsConfig;
use crate::error::{Result, TierFsError};
use crate::rpc::{MetadataClient, MetadataRouter};
use crate::storage::StorageTransport;
use crate::stream::{InputStream, OutputStream, StreamContext};
use crate::types::{
    FileHandle, FileInfo, FileName, FileType, LocationClass, StorageClass, StorageTier,
};

/// Handle on the client data path. Cloning shares the inner state.
#[derive(Clone)]
pub struct TierFs {
    inner: Arc<FsInner>,
}

struct FsInner {
    config: Arc<FsConfig>,
    meta: Arc<dyn MetadataClient>,
    pool: Arc<BufferPool>,
    /// Checkout table for buffers inside in-flight transfers, shared by
    /// every stream of this client.
    in_flight: Arc<BufferCheckout>,
    blocks: Arc<BlockLocationCache>,
    endpoints: Arc<EndpointCache>,
    closed: AtomicBool,
}

impl TierFs {
    /// Mount the client over its external collaborators: one metadata
    /// connection per partition (more than one goes behind the router) and
    /// one transport per reachable storage tier.
    pub fn mount(
        config: FsConfig,
        partitions: Vec<Arc<dyn MetadataClient>>,
        transports: HashMap<StorageTier, Arc<dyn StorageTransport>>,
    ) -> Result<Self> {
        config.validate()?;
        let meta: Arc<dyn MetadataClient> = match partitions.len() {
            1 => Arc::clone(&partitions[0]),
            _ => Arc::new(MetadataRouter::new(partitions)?),
        };
        let pool = Arc::new(BufferPool::new(&config.buffer)?);
        info!(
            block_size = config.block_size,
            buffer_size = config.buffer.buffer_size,
            tiers = transports.len(),
            "tierfs client mounted"
        );
        Ok(Self {
            inner: Arc::new(FsInner {
                config: Arc::new(config),
                meta,
                pool,
                in_flight: Arc::new(BufferCheckout::new()),
                blocks: Arc::new(BlockLocationCache::new()),
                endpoints: Arc::new(EndpointCache::new(transports)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Create a file and open it. The response's pre-allocated first block
    /// seeds the location cache, so the first write costs no extra RPC.
    pub async fn create(
        &self,
        path: &str,
        storage_class: StorageClass,
        location_class: LocationClass,
    ) -> Result<FileNode> {
        self.ensure_open()?;
        let name = FileName::parse(path)?;
        let response = self
            .inner
            .meta
            .create_file(&name, FileType::RegularFile, storage_class, location_class)
            .await?;
        self.inner.blocks.put(response.file.fd, 0, response.file_block);
        debug!(path, fd = response.file.fd, "created file");
        Ok(self.node(response.file))
    }

    /// Look up a file and open it. With `writeable` set the metadata
    /// service grants the append token if nobody else holds it.
    pub async fn lookup(&self, path: &str, writeable: bool) -> Result<FileNode> {
        self.ensure_open()?;
        let name = FileName::parse(path)?;
        let response = self.inner.meta.lookup_file(&name, writeable).await?;
        self.inner.blocks.put(response.file.fd, 0, response.file_block);
        Ok(self.node(response.file))
    }

    /// Remove a file and evict its cached block locations.
    pub async fn remove(&self, path: &str) -> Result<FileInfo> {
        self.ensure_open()?;
        let name = FileName::parse(path)?;
        let info = self.inner.meta.remove_file(&name).await?;
        self.inner.blocks.evict(info.fd);
        Ok(info)
    }

    /// Rename `src` to `dst`. Both must hash to the same metadata
    /// partition; a cross-partition rename fails fast without contacting
    /// either one. Cached locations of the renamed file are dropped.
    pub async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.ensure_open()?;
        let src = FileName::parse(src)?;
        let dst = FileName::parse(dst)?;
        self.inner.meta.rename_file(&src, &dst).await?;
        // The descriptor is unknown here; learn it from the new name. A
        // failed lookup only leaves harmless fd-keyed entries behind.
        match self.inner.meta.lookup_file(&dst, false).await {
            Ok(response) => self.inner.blocks.evict(response.file.fd),
            Err(e) => debug!(error = %e, "post-rename lookup failed, cache not evicted"),
        }
        Ok(())
    }

    /// Liveness probe against some metadata partition (round-robin).
    pub async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.meta.ping().await
    }

    /// Check a native buffer out of the pool for zero-copy I/O.
    pub fn allocate_buffer(&self) -> Result<NativeBuffer> {
        self.ensure_open()?;
        self.inner.pool.allocate()
    }

    /// Return a buffer obtained from [`TierFs::allocate_buffer`]. Returning
    /// one twice is a typed error.
    pub fn free_buffer(&self, buffer: NativeBuffer) -> Result<()> {
        self.inner.pool.free(buffer)
    }

    /// Drop every cached block location. Endpoints stay connected.
    pub fn purge_caches(&self) {
        self.inner.blocks.purge();
    }

    /// Statistics across the pool and both caches.
    pub fn stats(&self) -> FsStatsSnapshot {
        FsStatsSnapshot {
            pool: self.inner.pool.stats(),
            blocks: self.inner.blocks.stats(),
            endpoints: self.inner.endpoints.stats(),
        }
    }

    /// Tear the client down: endpoints, metadata connections, buffer pool.
    /// Idempotent. Streams must be closed first; buffers they still hold
    /// stay valid until dropped but can no longer be pooled.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.blocks.purge();
        let endpoints = self.inner.endpoints.close().await;
        let meta = self.inner.meta.close().await;
        self.inner.pool.close();
        info!("tierfs client closed");
        endpoints.and(meta)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TierFsError::FsClosed);
        }
        Ok(())
    }

    fn node(&self, info: FileInfo) -> FileNode {
        FileNode {
            fs: Arc::clone(&self.inner),
            file: Arc::new(FileHandle::new(info)),
        }
    }
}

/// Combined statistics snapshot of one client.
#[derive(Debug, Clone)]
pub struct FsStatsSnapshot {
    pub pool: PoolStatsSnapshot,
    pub blocks: BlockCacheSnapshot,
    pub endpoints: EndpointCacheSnapshot,
}

/// An open file, produced by create or lookup. Opens streams; one stream
/// per concurrent caller, the handle itself is shareable.
pub struct FileNode {
    fs: Arc<FsInner>,
    file: Arc<FileHandle>,
}

impl std::fmt::Debug for FileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNode")
            .field("fd", &self.file.fd())
            .field("capacity", &self.file.capacity())
            .field("writeable", &self.file.writeable())
            .finish()
    }
}

impl FileNode {
    pub fn fd(&self) -> crate::types::Fd {
        self.file.fd()
    }

    pub fn capacity(&self) -> u64 {
        self.file.capacity()
    }

    /// Whether this node holds the append token.
    pub fn writeable(&self) -> bool {
        self.file.writeable()
    }

    /// Open a reader positioned at the start of the file.
    pub fn input(&self) -> Result<InputStream> {
        Ok(InputStream::new(self.context()?))
    }

    /// Open an appender. Requires the append token; a read-only lookup
    /// cannot write.
    pub fn output(&self) -> Result<OutputStream> {
        if !self.file.writeable() {
            return Err(TierFsError::ReadOnly);
        }
        Ok(OutputStream::new(self.context()?))
    }

    fn context(&self) -> Result<StreamContext> {
        if self.fs.closed.load(Ordering::Acquire) {
            return Err(TierFsError::FsClosed);
        }
        Ok(StreamContext {
            config: Arc::clone(&self.fs.config),
            pool: Arc::clone(&self.fs.pool),
            in_flight: Arc::clone(&self.fs.in_flight),
            meta: Arc::clone(&self.fs.meta),
            blocks: Arc::clone(&self.fs.blocks),
            endpoints: Arc::clone(&self.fs.endpoints),
            file: Arc::clone(&self.file),
        })
    }
}
