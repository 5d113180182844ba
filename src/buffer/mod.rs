//! Native buffer management.
//!
//! Streams and zero-copy callers work on [`NativeBuffer`]s: fixed-size views
//! into native memory with a stable base address. Buffers come from a
//! [`BufferPool`], which slices them out of large memory-mapped regions (or
//! the heap when mapped memory is disabled) and recycles them across
//! operations. A [`BufferCheckout`] table keyed by base address catches the
//! two caller errors that would otherwise corrupt data silently: returning a
//! buffer twice, and feeding one buffer into two in-flight transfers.

mod checkout;
mod native;
mod pool;
mod region;

pub use checkout::BufferCheckout;
pub use native::NativeBuffer;
pub use pool::{BufferPool, PoolStatsSnapshot};

pub(crate) use region::Region;
