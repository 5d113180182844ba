//! External storage transport interfaces.
//!
//! One [`StorageTransport`] exists per storage tier; the endpoint cache
//! drives `connect` lazily and shares the resulting [`StorageEndpoint`]s
//! across streams. Transfers move the readable/writable span of a
//! [`NativeBuffer`] view; an endpoint either transfers the whole span or
//! fails, partial transfers are an endpoint bug.

use async_trait::async_trait;
use std::sync::Arc;

use crate::buffer::NativeBuffer;
use crate::error::Result;
use crate::types::{BlockLocation, NodeInfo};

/// Connection factory for one storage tier.
#[async_trait]
pub trait StorageTransport: Send + Sync {
    /// Open a connection to `node`. Called at most once per node; the
    /// endpoint cache holds the result for the process lifetime.
    async fn connect(&self, node: &NodeInfo) -> Result<Arc<dyn StorageEndpoint>>;
}

/// An open connection to one storage node.
#[async_trait]
pub trait StorageEndpoint: Send + Sync {
    /// Write the readable bytes of `src` into `block` starting at
    /// `block_offset`. Resolves to the bytes written.
    async fn write(&self, src: NativeBuffer, block: BlockLocation, block_offset: u64)
        -> Result<u64>;

    /// Read from `block` starting at `block_offset` into the writable bytes
    /// of `dst`. Resolves to the bytes read.
    async fn read(&self, dst: NativeBuffer, block: BlockLocation, block_offset: u64)
        -> Result<u64>;

    /// Tear down the connection. In-flight transfers on other tasks finish
    /// or fail according to the transport.
    async fn close(&self) -> Result<()>;
}
