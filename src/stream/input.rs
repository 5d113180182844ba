//! Read side of the buffered stream.

use tracing::debug;

use super::StreamContext;
use crate::buffer::NativeBuffer;
use crate::error::{Result, TierFsError};
use crate::ops::DataOperation;

/// Buffered reader over one file.
///
/// The window holds the bytes `[window_start, window_start + limit)`; the
/// stream position always equals `window_start + window.position()` while
/// the window is valid. Fetches are awaited inside `read`, bounded by the
/// configured data timeout; the zero-copy path hands the in-flight handle to
/// the caller instead.
pub struct InputStream {
    ctx: StreamContext,
    position: u64,
    window: Option<NativeBuffer>,
    window_start: u64,
    /// Highest offset already hinted to the location cache; gates read-ahead
    /// to one hint per window.
    hinted: u64,
    closed: bool,
}

impl InputStream {
    pub(crate) fn new(ctx: StreamContext) -> Self {
        Self {
            ctx,
            position: 0,
            window: None,
            window_start: 0,
            hinted: 0,
            closed: false,
        }
    }

    /// Logical read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes readable from this file, as known when it was opened or last
    /// extended by a completed write on the same handle.
    pub fn capacity(&self) -> u64 {
        self.ctx.file.capacity()
    }

    /// Copy up to `dst.len()` bytes at the current position, advancing it.
    /// Returns the count copied; `Ok(0)` at end-of-stream.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(TierFsError::StreamClosed);
        }
        let mut copied = 0;
        while copied < dst.len() {
            if self.remaining_in_window() == 0 && !self.fill_window().await? {
                break;
            }
            let window = self.window.as_mut().expect("filled window exists");
            let n = window.copy_into(&mut dst[copied..]);
            copied += n;
            self.position += n as u64;
        }
        Ok(copied)
    }

    /// Read `dst.len()` bytes at `pos` without moving the logical position.
    ///
    /// Implemented as seek, read, seek back; interleaving another operation
    /// from a second caller between those steps corrupts the position, which
    /// is one reason a stream is single-caller.
    pub async fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> Result<usize> {
        let saved = self.position;
        self.seek(pos)?;
        let result = self.read(dst).await;
        self.seek(saved)?;
        result
    }

    /// Move the read position. Positions inside the buffered window keep the
    /// window and cost no I/O; anything else invalidates it.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if self.closed {
            return Err(TierFsError::StreamClosed);
        }
        let capacity = self.ctx.file.capacity();
        if pos > capacity {
            return Err(TierFsError::SeekOutOfRange {
                position: pos,
                capacity,
            });
        }
        if let Some(window) = self.window.as_mut() {
            let end = self.window_start + window.limit() as u64;
            if pos >= self.window_start && pos <= end {
                window.set_position((pos - self.window_start) as usize);
                self.position = pos;
                return Ok(());
            }
            debug!(
                from = self.position,
                to = pos,
                "seek leaves buffered window"
            );
            self.invalidate_window()?;
        }
        self.position = pos;
        Ok(())
    }

    /// Zero-copy read: issue an asynchronous fetch of up to `dst.remaining()`
    /// bytes at the current position directly into `dst`, and return the
    /// in-flight handle; the buffer comes back through the handle's result.
    /// `Ok(None)` at end-of-stream. Advances the position by the length
    /// issued, so the caller can pipeline the next read immediately.
    pub async fn read_native(&mut self, mut dst: NativeBuffer) -> Result<Option<DataOperation>> {
        if self.closed {
            let _ = self.ctx.pool.free(dst);
            return Err(TierFsError::StreamClosed);
        }
        let capacity = self.ctx.file.capacity();
        if self.position >= capacity || dst.remaining() == 0 {
            // Nothing to issue; the buffer goes home instead of leaking.
            self.ctx.pool.free(dst)?;
            return Ok(None);
        }
        // The zero-copy path bypasses the window; drop it so the next
        // buffered read refetches at the advanced position.
        self.invalidate_window()?;

        let len = (dst.remaining() as u64).min(capacity - self.position);
        dst.set_limit(dst.position() + len as usize);
        let op = self.ctx.issue(dst, self.position, false).await?;
        self.position += len;
        Ok(Some(op))
    }

    /// Idempotent; returns the window to the pool.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.invalidate_window()
    }

    fn remaining_in_window(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.remaining())
    }

    fn invalidate_window(&mut self) -> Result<()> {
        match self.window.take() {
            Some(window) => self.ctx.pool.free(window),
            None => Ok(()),
        }
    }

    /// Fetch the window covering the current position. Returns false at
    /// end-of-stream. The first window is trimmed so later windows start on
    /// buffer-size boundaries.
    async fn fill_window(&mut self) -> Result<bool> {
        let capacity = self.ctx.file.capacity();
        if self.position >= capacity {
            return Ok(false);
        }
        self.invalidate_window()?;

        let align = self.ctx.buffer_size() - self.position % self.ctx.buffer_size();
        let len = align.min(capacity - self.position);

        let mut buffer = self.ctx.pool.allocate()?;
        buffer.set_limit(len as usize);
        let op = self.ctx.issue(buffer, self.position, false).await?;

        self.maybe_read_ahead(self.position + len, capacity);

        let transfer = op.wait(self.ctx.config.rpc.data_timeout).await?;
        let mut window = transfer.buffer.expect("successful read returns its buffer");
        window.set_limit(transfer.len as usize);
        window.set_position(0);
        self.window = Some(window);
        self.window_start = self.position;
        Ok(true)
    }

    /// During sequential reads, resolve the next window's first block while
    /// the current fetch is still in flight. One hint per window.
    fn maybe_read_ahead(&mut self, next: u64, capacity: u64) {
        if !self.ctx.config.stream.read_ahead || next >= capacity || next <= self.hinted {
            return;
        }
        self.hinted = next;
        self.ctx.locate_ahead(next);
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
