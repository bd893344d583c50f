//! Local catalogue of comics, categories, and granted folders backed by SQLite.
//!
//! Every function here takes a borrowed [`rusqlite::Connection`]; callers obtain one from
//! [`Database::conn`] and hold the lock for the duration of a use case.

pub mod categories;
pub mod comics;
pub mod db;
pub mod folders;
pub mod query;

use std::path::{Path, PathBuf};

pub use categories::Category;
pub use comics::{Comic, ScannedComic, UpsertOutcome};
pub use db::Database;
pub use folders::GrantedFolder;
pub use query::{CategoryFilter, ComicPage, ComicQuery, ReadFilter, SortKey, SortOrder};

/// Shared result type for store operations.
pub type Result<T> = crate::Result<T>;

/// Paths are stored as text; non UTF-8 components are replaced lossily.
pub(crate) fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn path_from_sql(value: String) -> PathBuf {
    PathBuf::from(value)
}
