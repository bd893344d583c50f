//! Core library for the comic shelf: folder scanning, the local catalogue, and the page viewer.

#![deny(missing_debug_implementations)]

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fs;
pub mod jobs;
pub mod library;
pub mod log;
pub mod meta;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod types;
pub mod viewer;

use std::time::{SystemTime, UNIX_EPOCH};

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use config::ShelfConfig;
pub use error::ShelfError;
pub use library::{Library, ScanReport};
pub use types::{
    CacheBudget, CategoryId, ComicId, ComicKind, ImageDimensions, ImageKey, PageId, PrefetchPolicy,
};

/// Returns the version of the core crate for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Milliseconds since the Unix epoch; clocks set before 1970 read as zero.
pub(crate) fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).map(|delta| delta.as_millis() as i64).unwrap_or_default()
}

pub(crate) fn now_ms() -> i64 {
    millis_since_epoch(SystemTime::now())
}
