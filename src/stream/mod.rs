//! Buffered streams over block storage.
//!
//! A stream owns one native buffer as a sliding window over a file's blocks.
//! [`InputStream`] refills the window by fetching blocks ahead of the
//! application's reads; [`OutputStream`] drains it by purging full windows
//! into pipelined writes. Both expose a zero-copy path that moves data
//! directly between a caller-supplied buffer and the storage nodes.
//!
//! A stream instance is single-caller: operations take `&mut self`, and
//! compound operations (positioned reads) are seek+read+seek-back, not
//! atomic. Concurrent access to one file takes one stream per caller; the
//! caches underneath are shared and built for that.

mod input;
mod output;

pub use input::InputStream;
pub use output::{FlushHandle, OutputStream};

use std::sync::Arc;

use crate::buffer::{BufferCheckout, BufferPool, NativeBuffer};
use crate::cache::{BlockLocationCache, EndpointCache};
use crate::config::FsConfig;
use crate::error::Result;
use crate::ops::{DataOperation, TransferHandle};
use crate::rpc::MetadataClient;
use crate::types::FileHandle;

/// Everything a stream needs besides its own cursor state. Cheap to clone;
/// all members are shared with the owning file system handle.
#[derive(Clone)]
pub(crate) struct StreamContext {
    pub config: Arc<FsConfig>,
    pub pool: Arc<BufferPool>,
    pub in_flight: Arc<BufferCheckout>,
    pub meta: Arc<dyn MetadataClient>,
    pub blocks: Arc<BlockLocationCache>,
    pub endpoints: Arc<EndpointCache>,
    pub file: Arc<FileHandle>,
}

impl StreamContext {
    fn block_size(&self) -> u64 {
        self.config.block_size
    }

    fn buffer_size(&self) -> u64 {
        self.config.buffer.buffer_size as u64
    }

    /// Start offset of the block covering `position`.
    fn block_start(&self, position: u64) -> u64 {
        position - position % self.block_size()
    }

    /// Resolve the block covering `position` through the location cache; a
    /// miss costs one metadata RPC shared with every concurrent caller.
    async fn locate(&self, position: u64) -> Result<crate::types::BlockLocation> {
        let block_start = self.block_start(position);
        let meta = Arc::clone(&self.meta);
        let (fd, token, capacity) = (self.file.fd(), self.file.token(), self.file.capacity());
        self.blocks
            .get_or_fetch(fd, block_start, || async move {
                meta.get_block(fd, token, block_start, capacity).await
            })
            .await
    }

    /// Hint the cache about the block covering `position` without waiting.
    fn locate_ahead(&self, position: u64) {
        let block_start = self.block_start(position);
        let meta = Arc::clone(&self.meta);
        let (fd, token, capacity) = (self.file.fd(), self.file.token(), self.file.capacity());
        self.blocks.prefetch(fd, block_start, move || async move {
            meta.get_block(fd, token, block_start, capacity).await
        });
    }

    /// Fan the span `[buffer.position, buffer.limit)` of `buffer` out into
    /// per-block transfers at file offset `start`, one spawned task per
    /// block touched. The returned operation owns the buffer until it
    /// resolves.
    ///
    /// A location or endpoint failure part-way through drops the operation,
    /// which routes the buffer through the reclaim path once the transfers
    /// already issued settle.
    async fn issue(&self, buffer: NativeBuffer, start: u64, write: bool) -> Result<DataOperation> {
        let span_base = buffer.position();
        let span_len = buffer.remaining();
        let mut op = DataOperation::new(
            buffer,
            Arc::clone(&self.pool),
            Arc::clone(&self.in_flight),
            Arc::clone(&self.file),
            start,
            write,
        )?;

        let block_size = self.block_size();
        let mut done = 0u64;
        while done < span_len as u64 {
            let position = start + done;
            let location = self.locate(position).await?;
            let endpoint = self.endpoints.get(&location.node).await?;

            let within_block = position - self.block_start(position);
            let n = (span_len as u64 - done).min(block_size - within_block);
            let view = op.buffer().slice_view(span_base + done as usize, n as usize);

            op.add(TransferHandle::spawn(async move {
                if write {
                    endpoint.write(view, location, within_block).await
                } else {
                    endpoint.read(view, location, within_block).await
                }
            }));
            done += n;
        }
        Ok(op)
    }
}
