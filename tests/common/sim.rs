//! In-memory metadata service and storage transport implementing the
//! external interfaces, with per-RPC call counters for verifying how many
//! requests the data path actually issues.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tierfs::buffer::NativeBuffer;
use tierfs::error::{MetaError, Result};
use tierfs::rpc::{CreateResponse, LookupResponse, MetadataClient};
use tierfs::storage::{StorageEndpoint, StorageTransport};
use tierfs::types::{
    BlockLocation, Fd, FileInfo, FileName, FileType, LocationClass, NodeInfo, StorageClass, Token,
};

/// Per-operation RPC counters.
#[derive(Default)]
pub struct SimCalls {
    pub create: AtomicU64,
    pub lookup: AtomicU64,
    pub remove: AtomicU64,
    pub rename: AtomicU64,
    pub set_file: AtomicU64,
    pub get_block: AtomicU64,
    pub get_location: AtomicU64,
    pub ping: AtomicU64,
}

impl SimCalls {
    pub fn total(&self) -> u64 {
        self.create.load(Ordering::SeqCst)
            + self.lookup.load(Ordering::SeqCst)
            + self.remove.load(Ordering::SeqCst)
            + self.rename.load(Ordering::SeqCst)
            + self.set_file.load(Ordering::SeqCst)
            + self.get_block.load(Ordering::SeqCst)
            + self.get_location.load(Ordering::SeqCst)
            + self.ping.load(Ordering::SeqCst)
    }
}

/// One simulated metadata partition: a namespace map and a block allocator.
pub struct SimMetadata {
    block_size: u64,
    nodes: Vec<NodeInfo>,
    files: Mutex<HashMap<FileName, FileInfo>>,
    blocks: Mutex<HashMap<(Fd, u64), BlockLocation>>,
    next_fd: AtomicU64,
    next_lba: AtomicU64,
    pub calls: SimCalls,
}

impl SimMetadata {
    pub fn new(block_size: u64, nodes: Vec<NodeInfo>) -> Self {
        assert!(!nodes.is_empty(), "simulated cluster needs storage nodes");
        Self {
            block_size,
            nodes,
            files: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            next_fd: AtomicU64::new(1),
            next_lba: AtomicU64::new(0),
            calls: SimCalls::default(),
        }
    }

    fn alloc_block(&self, fd: Fd, block_start: u64) -> BlockLocation {
        let mut blocks = self.blocks.lock();
        *blocks.entry((fd, block_start)).or_insert_with(|| {
            let lba = self.next_lba.fetch_add(1, Ordering::SeqCst);
            BlockLocation {
                node: self.nodes[lba as usize % self.nodes.len()],
                lba,
                addr: lba * self.block_size,
                length: self.block_size as u32,
                rkey: 0,
            }
        })
    }

    fn file(&self, name: &FileName) -> Result<FileInfo> {
        self.files
            .lock()
            .get(name)
            .copied()
            .ok_or_else(|| MetaError::FileNotFound.into())
    }
}

#[async_trait]
impl MetadataClient for SimMetadata {
    async fn create_file(
        &self,
        name: &FileName,
        file_type: FileType,
        _storage_class: StorageClass,
        _location_class: LocationClass,
    ) -> Result<CreateResponse> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Err(MetaError::FileExists.into());
        }
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        let info = FileInfo {
            fd,
            file_type,
            capacity: 0,
            token: fd,
            modified: SystemTime::now(),
        };
        files.insert(name.clone(), info);
        drop(files);
        Ok(CreateResponse {
            file: info,
            file_block: self.alloc_block(fd, 0),
        })
    }

    async fn lookup_file(&self, name: &FileName, writeable: bool) -> Result<LookupResponse> {
        self.calls.lookup.fetch_add(1, Ordering::SeqCst);
        let mut info = self.file(name)?;
        if !writeable {
            info.token = 0;
        }
        Ok(LookupResponse {
            file: info,
            file_block: self.alloc_block(info.fd, 0),
        })
    }

    async fn remove_file(&self, name: &FileName) -> Result<FileInfo> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .remove(name)
            .ok_or_else(|| MetaError::FileNotFound.into())
    }

    async fn rename_file(&self, src: &FileName, dst: &FileName) -> Result<()> {
        self.calls.rename.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock();
        let info = files
            .remove(src)
            .ok_or(MetaError::SrcFileNotFound)?;
        files.insert(dst.clone(), info);
        Ok(())
    }

    async fn set_file(&self, file: &FileInfo, _close: bool) -> Result<()> {
        self.calls.set_file.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock();
        for info in files.values_mut() {
            if info.fd == file.fd {
                info.capacity = info.capacity.max(file.capacity);
                return Ok(());
            }
        }
        Err(MetaError::FileNotOpen.into())
    }

    async fn get_block(
        &self,
        fd: Fd,
        _token: Token,
        position: u64,
        _capacity: u64,
    ) -> Result<BlockLocation> {
        self.calls.get_block.fetch_add(1, Ordering::SeqCst);
        let block_start = position - position % self.block_size;
        Ok(self.alloc_block(fd, block_start))
    }

    async fn get_location(&self, name: &FileName, position: u64) -> Result<BlockLocation> {
        self.calls.get_location.fetch_add(1, Ordering::SeqCst);
        let info = self.file(name)?;
        let block_start = position - position % self.block_size;
        Ok(self.alloc_block(info.fd, block_start))
    }

    async fn ping(&self) -> Result<()> {
        self.calls.ping.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Byte store shared by every endpoint of one simulated transport: one
/// fixed-size vector per logical block address.
type BlockStore = Arc<Mutex<HashMap<u64, Vec<u8>>>>;

/// Simulated transport for one tier, counting connects and transfers.
pub struct SimTransport {
    store: BlockStore,
    pub connects: AtomicU64,
    pub writes: Arc<AtomicU64>,
    pub reads: Arc<AtomicU64>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            connects: AtomicU64::new(0),
            writes: Arc::new(AtomicU64::new(0)),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageTransport for SimTransport {
    async fn connect(&self, _node: &NodeInfo) -> Result<Arc<dyn StorageEndpoint>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SimEndpoint {
            store: Arc::clone(&self.store),
            writes: Arc::clone(&self.writes),
            reads: Arc::clone(&self.reads),
        }))
    }
}

pub struct SimEndpoint {
    store: BlockStore,
    writes: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
}

#[async_trait]
impl StorageEndpoint for SimEndpoint {
    async fn write(&self, src: NativeBuffer, block: BlockLocation, off: u64) -> Result<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let data = src.remaining_slice();
        let mut store = self.store.lock();
        let bytes = store
            .entry(block.lba)
            .or_insert_with(|| vec![0u8; block.length as usize]);
        let off = off as usize;
        bytes[off..off + data.len()].copy_from_slice(data);
        Ok(data.len() as u64)
    }

    async fn read(&self, mut dst: NativeBuffer, block: BlockLocation, off: u64) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let n = dst.remaining();
        let off = off as usize;
        let store = self.store.lock();
        match store.get(&block.lba) {
            Some(bytes) => dst.remaining_slice_mut().copy_from_slice(&bytes[off..off + n]),
            // Allocated but never written reads as zeros.
            None => dst.remaining_slice_mut().fill(0),
        }
        Ok(n as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
