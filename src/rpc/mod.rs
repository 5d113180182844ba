//! Metadata service client interface.
//!
//! The wire protocol lives outside this crate; tierfs consumes it through
//! [`MetadataClient`]. Implementations resolve each call against one
//! metadata partition. With several partitions, [`MetadataRouter`] wraps the
//! per-partition clients behind the same trait, so the rest of the crate
//! never distinguishes one partition from many.

pub mod router;

pub use router::MetadataRouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    BlockLocation, Fd, FileInfo, FileName, FileType, LocationClass, StorageClass, Token,
};

/// Result of creating a file: its metadata and the pre-allocated first
/// block, which callers cache to spare the first write an extra RPC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateResponse {
    pub file: FileInfo,
    pub file_block: BlockLocation,
}

/// Result of looking up a file; carries the first block like create.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LookupResponse {
    pub file: FileInfo,
    pub file_block: BlockLocation,
}

/// Asynchronous client for one metadata partition (or, via the router, a
/// whole partitioned namespace).
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Create a file. `storage_class` and `location_class` hint block
    /// placement; the service decides.
    async fn create_file(
        &self,
        name: &FileName,
        file_type: FileType,
        storage_class: StorageClass,
        location_class: LocationClass,
    ) -> Result<CreateResponse>;

    /// Look up a file. With `writeable` set, the service grants the append
    /// token if available.
    async fn lookup_file(&self, name: &FileName, writeable: bool) -> Result<LookupResponse>;

    /// Remove a file; returns its final metadata.
    async fn remove_file(&self, name: &FileName) -> Result<FileInfo>;

    /// Rename `src` to `dst` within one partition.
    async fn rename_file(&self, src: &FileName, dst: &FileName) -> Result<()>;

    /// Push capacity back to the service; `close` also releases the token.
    async fn set_file(&self, file: &FileInfo, close: bool) -> Result<()>;

    /// Resolve (or allocate, when writing past the end) the block covering
    /// `position`. The token proves append ownership for allocation.
    async fn get_block(&self, fd: Fd, token: Token, position: u64, capacity: u64)
        -> Result<BlockLocation>;

    /// Resolve the block covering `position` by name, without opening.
    async fn get_location(&self, name: &FileName, position: u64) -> Result<BlockLocation>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Tear down the connection.
    async fn close(&self) -> Result<()>;
}
