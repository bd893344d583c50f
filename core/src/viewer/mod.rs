//! Page viewer: page sources, the per-comic decoded-page cache, and background read-ahead.

mod session;
mod source;
mod worker;

pub use session::{ComicViewer, ViewerOptions};
#[cfg(feature = "pdf")]
pub use source::PdfSource;
pub use source::{ArchiveSource, FolderSource, PageSource, open_source};
pub use worker::PrefetchWorker;

pub type Result<T> = crate::Result<T>;
