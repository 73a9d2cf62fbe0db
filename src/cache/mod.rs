//! Response cache.
//!
//! This module knows nothing about HTTP. It provides:
//! - Entries stamped with their write time and a per-entry time-to-live
//! - Lazy expiry: a stale entry is dropped when it is next read
//! - Explicit maintenance via `cleanup` and an optional background sweeper

mod entry;
mod storage;

pub use entry::CacheEntry;
pub use storage::MemoryCache;
