//! Metadata embedded in comics and derived from their file names.

pub mod comicinfo;

pub use comicinfo::{ComicInfo, display_title, parse_bytes};

pub type Result<T> = crate::Result<T>;
