//! File system access layer: classification, archives, image folders, and tree scans.

pub mod archive;
pub mod folder;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod scan;
mod util;

pub use scan::{DiscoveredComic, ScanOptions, ScanOutcome, scan_tree};
pub use util::{
    COMIC_EXTENSIONS, IMAGE_EXTENSIONS, Token, is_comic_file, is_hidden, is_supported_image,
    natural_cmp, natural_cmp_path, tokenize,
};

/// Shared result type for fs operations.
pub type Result<T> = crate::Result<T>;
