//! tierfs - Client data path for a multi-tiered distributed storage service.
//!
//! tierfs turns ordinary stream reads and writes into fixed-size block
//! allocations at a metadata service and block transfers against per-node
//! storage endpoints, while recycling native memory buffers and network
//! connections across many concurrent file operations.
//!
//! # Features
//!
//! - **Buffered Streams**: one native buffer as a sliding window per stream,
//!   with pipelined writes and bounded in-flight depth.
//! - **Zero-Copy I/O**: block transfers directly into or out of
//!   caller-supplied native buffers, overlapping compute with I/O.
//! - **Location Caching**: at most one metadata RPC per (file, block), with
//!   read-ahead for sequential access.
//! - **Connection Caching**: one lazily-opened endpoint per storage node per
//!   tier, connected exactly once.
//! - **Partitioned Metadata**: deterministic routing of namespace and block
//!   operations across metadata partitions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          tierfs                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Facade: TierFs | FileNode                                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Streams: InputStream | OutputStream | DataOperation         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Caches: BlockLocationCache | EndpointCache | BufferPool     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  External: MetadataClient | StorageTransport (per tier)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use tierfs::client::TierFs;
//! use tierfs::config::FsConfig;
//! use tierfs::types::{LocationClass, StorageClass};
//!
//! # async fn example(
//! #     partitions: Vec<std::sync::Arc<dyn tierfs::rpc::MetadataClient>>,
//! #     transports: HashMap<tierfs::types::StorageTier, std::sync::Arc<dyn tierfs::storage::StorageTransport>>,
//! # ) -> tierfs::Result<()> {
//! let fs = TierFs::mount(FsConfig::default(), partitions, transports)?;
//!
//! let node = fs.create("/data/f", StorageClass::ANY, LocationClass::DEFAULT).await?;
//! let mut out = node.output()?;
//! out.write(b"hello").await?;
//! out.close().await?;
//!
//! fs.close().await
//! # }
//! ```

pub mod buffer;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod ops;
pub mod rpc;
pub mod storage;
pub mod stream;
pub mod types;

pub use client::{FileNode, TierFs};
pub use error::{Result, TierFsError};
