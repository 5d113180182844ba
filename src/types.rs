//! Core type definitions for the tierfs client data path.
//!
//! This module contains the fundamental data types shared across the crate:
//! file identities, block locations, storage node descriptors, and the
//! runtime file handle that streams operate on.
//!
//! # Key Types
//!
//! - [`FileName`]: routing identity of a path (per-component hashes)
//! - [`BlockLocation`]: where one fixed-size block lives (node, address, key)
//! - [`NodeInfo`]: a storage node within one storage tier
//! - [`FileHandle`]: shared runtime state of an open file (atomic capacity)
//!
//! # Examples
//!
//! ```rust
//! use tierfs::types::FileName;
//!
//! let name = FileName::parse("/data/run-1/part-00").unwrap();
//! assert_eq!(name.depth(), 3);
//! // The leading component alone decides the metadata partition.
//! assert_eq!(name.head(), FileName::parse("/data/other").unwrap().head());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::error::{Result, TierFsError};

/// File descriptor assigned by the metadata service.
pub type Fd = u64;

/// Append-ownership token. Zero means read-only.
pub type Token = u64;

/// Maximum number of path components in a [`FileName`].
pub const MAX_COMPONENTS: usize = 16;

/// Storage tier a node belongs to. Tiers differ in media and transport;
/// each tier has its own transport implementation and endpoint cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageTier {
    /// Byte-addressable memory tier.
    Dram,
    /// Flash tier.
    Nvme,
    /// Capacity/object tier.
    Object,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Dram => "dram",
            StorageTier::Nvme => "nvme",
            StorageTier::Object => "object",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-class placement hint carried on create. Opaque to the client;
/// the metadata service interprets it when picking blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StorageClass(pub u32);

impl StorageClass {
    /// No preference, any class qualifies.
    pub const ANY: StorageClass = StorageClass(0);
}

/// Location-affinity hint carried on create (e.g. rack or host locality).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocationClass(pub u32);

impl LocationClass {
    /// No affinity.
    pub const DEFAULT: LocationClass = LocationClass(0);
}

/// Type of a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
}

impl FileType {
    pub fn is_directory(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// One storage node within a tier, as reported by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Tier this node serves.
    pub tier: StorageTier,
    /// Storage class served by this node.
    pub storage_class: StorageClass,
    /// Location class of this node.
    pub location_class: LocationClass,
    /// Data-path address of the node.
    pub addr: SocketAddr,
}

impl NodeInfo {
    /// Stable cache key for this node: identity is (address, port), so the
    /// same node reported through different blocks maps to one endpoint.
    pub fn key(&self) -> u64 {
        let ip_hash = match self.addr.ip() {
            IpAddr::V4(v4) => crc32fast::hash(&v4.octets()),
            IpAddr::V6(v6) => crc32fast::hash(&v6.octets()),
        };
        (u64::from(ip_hash) << 32) | u64::from(self.addr.port())
    }
}

/// Location of one fixed-size block, produced once by the metadata service
/// and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    /// Node holding the block.
    pub node: NodeInfo,
    /// Logical block address at the node.
    pub lba: u64,
    /// Remote base address of the block.
    pub addr: u64,
    /// Block length in bytes.
    pub length: u32,
    /// Remote access key for the block's memory region.
    pub rkey: u32,
}

/// File metadata as carried on the wire by metadata responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileInfo {
    pub fd: Fd,
    pub file_type: FileType,
    pub capacity: u64,
    /// Write token granted to this client; zero for read-only opens.
    pub token: Token,
    pub modified: SystemTime,
}

/// Shared runtime state of an open file. Capacity grows atomically as
/// write transfers complete, so concurrent readers of the same handle see
/// bytes as soon as they are acknowledged.
#[derive(Debug)]
pub struct FileHandle {
    fd: Fd,
    file_type: FileType,
    token: Token,
    capacity: AtomicU64,
}

impl FileHandle {
    pub fn new(info: FileInfo) -> Self {
        Self {
            fd: info.fd,
            file_type: info.file_type,
            token: info.token,
            capacity: AtomicU64::new(info.capacity),
        }
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Whether this handle owns the append token.
    pub fn writeable(&self) -> bool {
        self.token > 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    /// Raise capacity to `new_capacity` if it grew. Completed writes land
    /// out of order, so only the maximum survives.
    pub fn extend_capacity(&self, new_capacity: u64) {
        self.capacity.fetch_max(new_capacity, Ordering::AcqRel);
    }
}

/// Routing identity of a path: each component reduced to a deterministic
/// signed 64-bit hash. The leading component pins namespace operations to
/// one metadata partition; block operations route by descriptor instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileName {
    components: Vec<i64>,
}

impl FileName {
    /// Parse an absolute path into its routing identity.
    pub fn parse(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(TierFsError::InvalidPath(format!(
                "path must be absolute: {path}"
            )));
        }
        let components: Vec<i64> = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(component_hash)
            .collect();
        if components.is_empty() {
            return Err(TierFsError::InvalidPath(
                "root itself is not addressable".into(),
            ));
        }
        if components.len() > MAX_COMPONENTS {
            return Err(TierFsError::InvalidPath(format!(
                "path exceeds {MAX_COMPONENTS} components: {path}"
            )));
        }
        Ok(Self { components })
    }

    /// Hash of the leading component; decides the metadata partition.
    pub fn head(&self) -> i64 {
        self.components[0]
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }
}

/// Deterministic per-component hash, sign-extended so callers must handle
/// negative values when reducing modulo a partition count.
fn component_hash(component: &str) -> i64 {
    i64::from(crc32fast::hash(component.as_bytes()) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16) -> NodeInfo {
        NodeInfo {
            tier: StorageTier::Dram,
            storage_class: StorageClass::ANY,
            location_class: LocationClass::DEFAULT,
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }

    #[test]
    fn test_file_name_parse() {
        let name = FileName::parse("/a/b/c").unwrap();
        assert_eq!(name.depth(), 3);
        assert_eq!(name.head(), FileName::parse("/a/x").unwrap().head());
        assert_ne!(name.head(), FileName::parse("/b/x").unwrap().head());
    }

    #[test]
    fn test_file_name_rejects_relative_and_root() {
        assert!(FileName::parse("a/b").is_err());
        assert!(FileName::parse("/").is_err());
    }

    #[test]
    fn test_file_name_component_limit() {
        let deep = format!("/{}", vec!["d"; MAX_COMPONENTS + 1].join("/"));
        assert!(FileName::parse(&deep).is_err());
        let ok = format!("/{}", vec!["d"; MAX_COMPONENTS].join("/"));
        assert!(FileName::parse(&ok).is_ok());
    }

    #[test]
    fn test_node_key_identity() {
        assert_eq!(node(50020).key(), node(50020).key());
        assert_ne!(node(50020).key(), node(50021).key());
    }

    #[test]
    fn test_capacity_only_grows() {
        let handle = FileHandle::new(FileInfo {
            fd: 7,
            file_type: FileType::RegularFile,
            capacity: 100,
            token: 1,
            modified: SystemTime::UNIX_EPOCH,
        });
        handle.extend_capacity(300);
        handle.extend_capacity(200);
        assert_eq!(handle.capacity(), 300);
    }
}
