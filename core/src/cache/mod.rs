//! Decoded-page memory cache and on-disk cover store.

pub mod disk;
pub mod memory;

pub use disk::DiskCache;
pub use memory::{CacheEntry, MemoryCache};

pub type Result<T> = crate::Result<T>;
