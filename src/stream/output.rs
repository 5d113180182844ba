//! Write side of the buffered stream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::StreamContext;
use crate::buffer::{BufferPool, NativeBuffer};
use crate::error::{Result, TierFsError};
use crate::ops::DataOperation;
use crate::types::FileInfo;

/// Buffered appender over one file.
///
/// Writes copy into the window; a full window flips to drain mode and goes
/// out as one pipelined operation while the application keeps writing into a
/// fresh window. At most `stream.max_in_flight` windows ride the network at
/// once; filling past that bound first waits out the oldest. `close`
/// settles everything and syncs the grown capacity back to the metadata
/// service.
pub struct OutputStream {
    ctx: StreamContext,
    position: u64,
    window: Option<NativeBuffer>,
    window_start: u64,
    in_flight: VecDeque<DataOperation>,
    /// Capacity last made visible to the metadata service.
    synced: u64,
    closed: bool,
}

impl OutputStream {
    /// Streams append: the write position starts at the current capacity.
    pub(crate) fn new(ctx: StreamContext) -> Self {
        let position = ctx.file.capacity();
        Self {
            ctx,
            position,
            window: None,
            window_start: position,
            in_flight: VecDeque::new(),
            synced: position,
            closed: false,
        }
    }

    /// Logical write position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Copy `src` into the stream, purging the window whenever it fills.
    pub async fn write(&mut self, src: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TierFsError::StreamClosed);
        }
        let mut written = 0;
        while written < src.len() {
            let window = self.ensure_window().await?;
            let n = window.remaining().min(src.len() - written);
            window.put_bytes(&src[written..written + n]);
            written += n;
            self.position += n as u64;

            if self.window.as_ref().is_some_and(|w| w.remaining() == 0) {
                self.drain_window().await?;
            }
        }
        Ok(())
    }

    /// Zero-copy write of `src`'s readable span at the current position.
    ///
    /// Any bytes already buffered go out first, so data reaches storage in
    /// submission order, never reordered around the zero-copy write. The
    /// caller awaits the returned handle; the buffer comes back through its
    /// result.
    pub async fn write_native(&mut self, src: NativeBuffer) -> Result<DataOperation> {
        if self.closed {
            let _ = self.ctx.pool.free(src);
            return Err(TierFsError::StreamClosed);
        }
        if self.window.as_ref().is_some_and(|w| w.position() > 0) {
            self.drain_window().await?;
        } else if let Some(window) = self.window.take() {
            // An untouched window would sit at a stale offset after the
            // zero-copy write advances the position; give it back.
            self.ctx.pool.free(window)?;
        }
        let len = src.remaining() as u64;
        let op = self.ctx.issue(src, self.position, true).await?;
        self.position += len;
        Ok(op)
    }

    /// Switch the window to drain mode, send its contents, and hand back a
    /// handle over every write still in flight. A purge with nothing
    /// buffered and nothing in flight issues no network write and resolves
    /// immediately.
    pub async fn purge(&mut self) -> Result<FlushHandle> {
        if self.closed {
            return Err(TierFsError::StreamClosed);
        }
        if self.window.as_ref().is_some_and(|w| w.position() > 0) {
            self.drain_window().await?;
        }
        Ok(FlushHandle {
            ops: self.in_flight.drain(..).collect(),
            pool: Arc::clone(&self.ctx.pool),
        })
    }

    /// Present for API completeness; purging is the real mechanism and
    /// happens on window boundaries and close.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(TierFsError::StreamClosed);
        }
        Ok(())
    }

    /// Final purge, wait for every in-flight write, release the window and
    /// sync the capacity. A second close is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let handle = self.purge().await?;
        self.closed = true;
        if let Some(window) = self.window.take() {
            // Only an empty window survives a purge.
            self.ctx.pool.free(window)?;
        }
        handle.wait(self.ctx.config.rpc.data_timeout).await?;
        self.sync_capacity().await
    }

    /// A mutable handle on the current window, allocating one on demand.
    /// The first window is trimmed so later windows start on buffer-size
    /// boundaries.
    async fn ensure_window(&mut self) -> Result<&mut NativeBuffer> {
        if self.window.is_none() {
            self.reserve_in_flight_slot().await?;
            let align = self.ctx.buffer_size() - self.position % self.ctx.buffer_size();
            let mut buffer = self.ctx.pool.allocate()?;
            if (align as usize) < buffer.capacity() {
                buffer.set_limit(align as usize);
            }
            self.window = Some(buffer);
            self.window_start = self.position;
        }
        Ok(self.window.as_mut().expect("window just ensured"))
    }

    /// Flip the window and send it as one operation, pipelined behind any
    /// writes already in flight.
    async fn drain_window(&mut self) -> Result<()> {
        let Some(mut window) = self.window.take() else {
            return Ok(());
        };
        window.flip();
        if window.remaining() == 0 {
            return self.ctx.pool.free(window);
        }
        let op = self.ctx.issue(window, self.window_start, true).await?;
        self.in_flight.push_back(op);
        Ok(())
    }

    /// Apply backpressure: settle the oldest outstanding write once the
    /// pipeline is full.
    async fn reserve_in_flight_slot(&mut self) -> Result<()> {
        while self.in_flight.len() >= self.ctx.config.stream.max_in_flight {
            let oldest = self.in_flight.pop_front().expect("pipeline is non-empty");
            let transfer = oldest.wait(self.ctx.config.rpc.data_timeout).await?;
            if let Some(buffer) = transfer.buffer {
                self.ctx.pool.free(buffer)?;
            }
        }
        Ok(())
    }

    /// Push the grown capacity back to the metadata service, releasing the
    /// append token. Skipped when this stream holds no token or nothing was
    /// written.
    async fn sync_capacity(&self) -> Result<()> {
        let capacity = self.ctx.file.capacity();
        if !self.ctx.file.writeable() || capacity <= self.synced {
            return Ok(());
        }
        debug!(fd = self.ctx.file.fd(), capacity, "syncing capacity on close");
        let info = FileInfo {
            fd: self.ctx.file.fd(),
            file_type: self.ctx.file.file_type(),
            capacity,
            token: self.ctx.file.token(),
            modified: std::time::SystemTime::now(),
        };
        self.ctx.meta.set_file(&info, true).await
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        // In-flight operations reclaim themselves; an unfinished window
        // cannot, so return it here. Buffered-but-unpurged bytes are lost,
        // the same contract as dropping any unflushed writer.
        if let Some(window) = self.window.take() {
            let _ = self.ctx.pool.free(window);
        }
    }
}

/// Handle over the writes a purge left in flight. Waiting settles them in
/// submission order and recycles their windows.
pub struct FlushHandle {
    ops: Vec<DataOperation>,
    pool: Arc<BufferPool>,
}

impl FlushHandle {
    /// Non-blocking completion probe across every covered write.
    pub fn is_done(&mut self) -> bool {
        self.ops.iter_mut().all(|op| op.is_done())
    }

    /// Whether the purge had anything to send.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Await every covered write, each sub-transfer bounded by `per_sub`.
    /// Resolves to the total bytes written; the first failure short-circuits
    /// and the remaining operations reclaim their buffers in the background.
    pub async fn wait(self, per_sub: Duration) -> Result<u64> {
        let mut total = 0;
        for op in self.ops {
            let transfer = op.wait(per_sub).await?;
            total += transfer.len;
            if let Some(buffer) = transfer.buffer {
                self.pool.free(buffer)?;
            }
        }
        Ok(total)
    }
}
