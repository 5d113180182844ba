//! Client-side caches.
//!
//! Two caches decouple stream throughput from metadata and connection
//! latency: [`BlockLocationCache`] remembers where each (descriptor, block)
//! lives and deduplicates in-flight lookups, [`EndpointCache`] holds one
//! connection per storage node per tier. Both are ephemeral; a restarted
//! client rebuilds them from the metadata service.

mod blocks;
mod endpoints;

pub use blocks::{BlockCacheSnapshot, BlockLocationCache};
pub use endpoints::{EndpointCache, EndpointCacheSnapshot};
