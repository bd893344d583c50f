//! Domain errors surfaced to callers that need to branch on the failure.
//!
//! Most operations return [`crate::Result`] (an `anyhow::Error`); the variants below are raised
//! inside it and can be recovered with `err.downcast_ref::<ShelfError>()`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{CategoryId, ComicId, ComicKind};

#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("comic {0} not found")]
    ComicNotFound(ComicId),

    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("folder {0} has not been granted")]
    FolderNotGranted(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("a category named {0:?} already exists")]
    DuplicateCategory(String),

    #[error("category names must not be blank")]
    InvalidCategoryName,

    #[error("{kind} comics are not supported for reading ({path})")]
    UnsupportedFormat { path: PathBuf, kind: ComicKind },

    #[error("page {index} is out of range for a comic with {count} pages")]
    PageOutOfRange { index: u32, count: u32 },

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Returns the [`ShelfError`] carried by `err`, if any.
pub fn shelf_error(err: &anyhow::Error) -> Option<&ShelfError> {
    err.downcast_ref::<ShelfError>()
}
