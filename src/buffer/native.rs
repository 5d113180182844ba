//! Fixed-size native memory buffer with cursor semantics.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use super::Region;

/// A contiguous range of native memory with `position`/`limit` cursors.
///
/// The base address is stable for the buffer's lifetime and serves as its
/// identity in the checkout table. The owning [`Region`] is kept alive via
/// `Arc`, so a buffer sliced out of a mapped region never outlives its
/// mapping. Data sits between `position` and `limit`:
///
/// - writers fill `[position, limit)` and then `flip()` for draining
/// - readers consume `[position, limit)` and `clear()` for refilling
pub struct NativeBuffer {
    region: Arc<Region>,
    ptr: NonNull<u8>,
    cap: usize,
    pos: usize,
    limit: usize,
}

// A buffer is the exclusive owner of its range; mutation requires &mut.
unsafe impl Send for NativeBuffer {}
unsafe impl Sync for NativeBuffer {}

impl NativeBuffer {
    /// View `len` bytes of `region` starting at `offset`.
    pub(crate) fn from_region(region: Arc<Region>, offset: usize, len: usize) -> NativeBuffer {
        assert!(
            offset + len <= region.len(),
            "buffer range outside its region"
        );
        let ptr = unsafe { region.base().add(offset) };
        NativeBuffer {
            region,
            ptr: NonNull::new(ptr).expect("region base is non-null"),
            cap: len,
            pos: 0,
            limit: len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Panics if `pos` exceeds the limit; cursor misuse is
    /// a bug in the caller, not a recoverable condition.
    pub fn set_position(&mut self, pos: usize) {
        assert!(pos <= self.limit, "position {pos} beyond limit {}", self.limit);
        self.pos = pos;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Set the limit, clamping the position down if it now lies beyond it.
    pub fn set_limit(&mut self, limit: usize) {
        assert!(limit <= self.cap, "limit {limit} beyond capacity {}", self.cap);
        self.limit = limit;
        if self.pos > limit {
            self.pos = limit;
        }
    }

    /// Bytes left between position and limit.
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Reset for filling: position 0, limit at capacity.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.limit = self.cap;
    }

    /// Switch from filling to draining: limit at position, position 0.
    pub fn flip(&mut self) {
        self.limit = self.pos;
        self.pos = 0;
    }

    /// Stable base address; identity in the checkout table.
    pub fn address(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// The readable bytes `[position, limit)`.
    pub fn remaining_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(self.pos), self.remaining()) }
    }

    /// The writable bytes `[position, limit)`.
    pub fn remaining_slice_mut(&mut self) -> &mut [u8] {
        let len = self.remaining();
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(self.pos), len) }
    }

    /// Copy `src` into the buffer at the position and advance it. Panics if
    /// `src` does not fit; callers size their copies by `remaining()`.
    pub fn put_bytes(&mut self, src: &[u8]) {
        assert!(src.len() <= self.remaining(), "put overruns buffer limit");
        self.remaining_slice_mut()[..src.len()].copy_from_slice(src);
        self.pos += src.len();
    }

    /// Copy up to `dst.len()` bytes out of the buffer, advancing the
    /// position. Returns the number copied.
    pub fn copy_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.remaining_slice()[..n]);
        self.pos += n;
        n
    }

    /// A view of `[offset, offset + len)` sharing this buffer's region.
    ///
    /// Views let per-block transfers write disjoint ranges of one buffer
    /// concurrently. The caller must keep the parent quiescent while views
    /// exist; transfer plumbing guarantees that by parking the parent in its
    /// aggregator until every view resolves.
    pub(crate) fn slice_view(&self, offset: usize, len: usize) -> NativeBuffer {
        assert!(offset + len <= self.cap, "view outside parent buffer");
        let ptr = unsafe { self.ptr.as_ptr().add(offset) };
        NativeBuffer {
            region: Arc::clone(&self.region),
            ptr: NonNull::new(ptr).expect("parent pointer is non-null"),
            cap: len,
            pos: 0,
            limit: len,
        }
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("addr", &format_args!("{:#x}", self.address()))
            .field("capacity", &self.cap)
            .field("position", &self.pos)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_buffer(len: usize) -> NativeBuffer {
        NativeBuffer::from_region(Arc::new(Region::heap(len)), 0, len)
    }

    #[test]
    fn test_cursor_fill_drain_cycle() {
        let mut buf = heap_buffer(16);
        assert_eq!(buf.remaining(), 16);

        buf.put_bytes(b"hello");
        assert_eq!(buf.position(), 5);

        buf.flip();
        assert_eq!(buf.remaining(), 5);
        let mut out = [0u8; 8];
        let n = buf.copy_into(&mut out);
        assert_eq!(n, 5);
        assert_eq!(&out[..5], b"hello");
        assert_eq!(buf.remaining(), 0);

        buf.clear();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 16);
    }

    #[test]
    fn test_set_limit_clamps_position() {
        let mut buf = heap_buffer(16);
        buf.set_position(10);
        buf.set_limit(4);
        assert_eq!(buf.position(), 4);
    }

    #[test]
    #[should_panic(expected = "put overruns buffer limit")]
    fn test_put_past_limit_panics() {
        let mut buf = heap_buffer(4);
        buf.put_bytes(b"too long");
    }

    #[test]
    fn test_views_share_memory() {
        let mut parent = heap_buffer(32);
        parent.put_bytes(&[0u8; 32]);

        let mut left = parent.slice_view(0, 16);
        let mut right = parent.slice_view(16, 16);
        left.put_bytes(&[1u8; 16]);
        right.put_bytes(&[2u8; 16]);
        drop((left, right));

        parent.clear();
        assert_eq!(&parent.remaining_slice()[..16], &[1u8; 16]);
        assert_eq!(&parent.remaining_slice()[16..], &[2u8; 16]);
    }

    #[test]
    fn test_view_address_offset() {
        let parent = heap_buffer(32);
        let view = parent.slice_view(8, 8);
        assert_eq!(view.address(), parent.address() + 8);
        assert_eq!(view.capacity(), 8);
    }
}
