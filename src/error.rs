//! Error types for the tierfs client data path.
//!
//! This module provides a unified error type [`TierFsError`] for all tierfs
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! Errors are organized into the following categories:
//!
//! - **Stream**: closed streams, out-of-range seeks
//! - **Buffer**: checkout-table violations on pooled native buffers
//! - **Metadata**: structured error codes returned by the metadata service
//! - **Routing**: operations the partitioned namespace cannot support
//! - **Network**: connection failures, timeouts on in-flight transfers
//! - **Configuration**: invalid settings or unparseable configuration files
//!
//! Transient network failures are wrapped, never retried automatically: a
//! partially applied write retried without server-side acknowledgment could
//! duplicate data. Metadata codes pass through unchanged as [`MetaError`].
//! Contract violations (double buffer free, seek past capacity) fail fast.
//!
//! # Example
//!
//! ```rust
//! use tierfs::error::{Result, TierFsError};
//!
//! fn check_path(path: &str) -> Result<()> {
//!     if path.is_empty() {
//!         return Err(TierFsError::InvalidPath("path cannot be empty".into()));
//!     }
//!     Ok(())
//! }
//!
//! fn handle_error(err: &TierFsError) {
//!     if err.is_transient() {
//!         println!("I/O layer hiccup: {}", err);
//!     } else {
//!         println!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Main error type for tierfs operations.
#[derive(Error, Debug)]
pub enum TierFsError {
    // Stream errors
    #[error("Stream is closed")]
    StreamClosed,

    #[error("Seek position {position} out of range for capacity {capacity}")]
    SeekOutOfRange { position: u64, capacity: u64 },

    #[error("File is read-only (no write token)")]
    ReadOnly,

    // Buffer errors
    #[error("Buffer at address {0:#x} is already checked out")]
    BufferInUse(u64),

    #[error("Buffer at address {0:#x} is not checked out")]
    BufferNotCheckedOut(u64),

    // Metadata errors
    #[error("Metadata service error: {0}")]
    Metadata(#[from] MetaError),

    // Routing errors
    #[error("Rename not supported across metadata partitions")]
    CrossPartitionRename,

    #[error("No transport registered for storage tier: {0}")]
    UnknownTier(String),

    // Network errors
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Transfer task failed: {0}")]
    TaskFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File system handle is closed")]
    FsClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TierFsError {
    /// Convert to POSIX errno for file-system shim layers.
    pub fn to_errno(&self) -> i32 {
        match self {
            TierFsError::StreamClosed => libc::EBADF,
            TierFsError::SeekOutOfRange { .. } => libc::EINVAL,
            TierFsError::ReadOnly => libc::EACCES,
            TierFsError::BufferInUse(_) | TierFsError::BufferNotCheckedOut(_) => libc::EBUSY,
            TierFsError::Metadata(e) => e.to_errno(),
            TierFsError::CrossPartitionRename => libc::EXDEV,
            TierFsError::UnknownTier(_) => libc::ENODEV,
            TierFsError::ConnectionFailed(_) => libc::ECONNREFUSED,
            TierFsError::Timeout(_) => libc::ETIMEDOUT,
            TierFsError::InvalidPath(_) => libc::EINVAL,
            TierFsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            TierFsError::FsClosed => libc::ESHUTDOWN,
            _ => libc::EIO,
        }
    }

    /// Check whether the error came from the I/O layer rather than from a
    /// metadata decision or a caller contract violation. Transient errors are
    /// never retried internally; callers may.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TierFsError::ConnectionFailed(_)
                | TierFsError::Timeout(_)
                | TierFsError::TaskFailed(_)
                | TierFsError::Io(_)
        )
    }
}

impl From<serde_json::Error> for TierFsError {
    fn from(e: serde_json::Error) -> Self {
        TierFsError::Config(e.to_string())
    }
}

/// Structured error codes returned by the metadata service, passed through to
/// callers unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaError {
    #[error("Unknown error")]
    Unknown,

    #[error("Create file failed")]
    CreateFailed,

    #[error("Get file failed")]
    GetFailed,

    #[error("Write token already taken")]
    TokenTaken,

    #[error("File not open")]
    FileNotOpen,

    #[error("Token mismatch")]
    TokenMismatch,

    #[error("Capacity exceeded")]
    CapacityExceeded,

    #[error("Position is negative")]
    NegativePosition,

    #[error("Offset too large")]
    OffsetTooLarge,

    #[error("No free blocks")]
    NoFreeBlocks,

    #[error("No data nodes registered")]
    NoDataNodes,

    #[error("Data node not registered")]
    DataNodeNotRegistered,

    #[error("Parent directory missing")]
    ParentMissing,

    #[error("Parent is not a directory")]
    ParentNotDirectory,

    #[error("File already exists")]
    FileExists,

    #[error("File not found")]
    FileNotFound,

    #[error("Rename source not found")]
    SrcFileNotFound,

    #[error("Rename destination parent not found")]
    DstParentNotFound,

    #[error("Directory has children")]
    HasChildren,

    #[error("Too many path components")]
    ComponentsExceeded,

    #[error("Directory already exists")]
    DirectoryExists,

    #[error("File tree corrupt")]
    TreeCorrupt,

    #[error("File is not a directory")]
    NotADirectory,
}

impl MetaError {
    /// Decode a wire error code. Code 0 means success and has no error value;
    /// unassigned codes collapse to [`MetaError::Unknown`].
    pub fn from_code(code: u16) -> Self {
        match code {
            3 => MetaError::CreateFailed,
            4 => MetaError::GetFailed,
            5 => MetaError::TokenTaken,
            6 => MetaError::FileNotOpen,
            7 => MetaError::TokenMismatch,
            8 => MetaError::CapacityExceeded,
            9 => MetaError::NegativePosition,
            10 => MetaError::OffsetTooLarge,
            11 => MetaError::NoFreeBlocks,
            12 => MetaError::NoDataNodes,
            13 => MetaError::DataNodeNotRegistered,
            15 => MetaError::ParentMissing,
            16 => MetaError::ParentNotDirectory,
            17 => MetaError::FileExists,
            18 => MetaError::FileNotFound,
            19 => MetaError::SrcFileNotFound,
            20 => MetaError::DstParentNotFound,
            21 => MetaError::HasChildren,
            22 => MetaError::ComponentsExceeded,
            23 => MetaError::DirectoryExists,
            24 => MetaError::TreeCorrupt,
            25 => MetaError::NotADirectory,
            _ => MetaError::Unknown,
        }
    }

    /// The wire code for this error.
    pub fn code(&self) -> u16 {
        match self {
            MetaError::Unknown => 1,
            MetaError::CreateFailed => 3,
            MetaError::GetFailed => 4,
            MetaError::TokenTaken => 5,
            MetaError::FileNotOpen => 6,
            MetaError::TokenMismatch => 7,
            MetaError::CapacityExceeded => 8,
            MetaError::NegativePosition => 9,
            MetaError::OffsetTooLarge => 10,
            MetaError::NoFreeBlocks => 11,
            MetaError::NoDataNodes => 12,
            MetaError::DataNodeNotRegistered => 13,
            MetaError::ParentMissing => 15,
            MetaError::ParentNotDirectory => 16,
            MetaError::FileExists => 17,
            MetaError::FileNotFound => 18,
            MetaError::SrcFileNotFound => 19,
            MetaError::DstParentNotFound => 20,
            MetaError::HasChildren => 21,
            MetaError::ComponentsExceeded => 22,
            MetaError::DirectoryExists => 23,
            MetaError::TreeCorrupt => 24,
            MetaError::NotADirectory => 25,
        }
    }

    fn to_errno(self) -> i32 {
        match self {
            MetaError::FileNotFound | MetaError::SrcFileNotFound | MetaError::ParentMissing => {
                libc::ENOENT
            }
            MetaError::DstParentNotFound => libc::ENOENT,
            MetaError::FileExists | MetaError::DirectoryExists => libc::EEXIST,
            MetaError::ParentNotDirectory | MetaError::NotADirectory => libc::ENOTDIR,
            MetaError::HasChildren => libc::ENOTEMPTY,
            MetaError::CapacityExceeded | MetaError::NoFreeBlocks => libc::ENOSPC,
            MetaError::TokenTaken | MetaError::TokenMismatch => libc::EBUSY,
            MetaError::NegativePosition | MetaError::OffsetTooLarge => libc::EINVAL,
            MetaError::ComponentsExceeded => libc::ENAMETOOLONG,
            _ => libc::EIO,
        }
    }
}

/// Result type alias for tierfs operations.
pub type Result<T> = std::result::Result<T, TierFsError>;
