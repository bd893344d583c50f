//! Shared data structures exchanged between the store, the viewer, and the CLI shell.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Row identifier of a catalogued comic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComicId(pub i64);

impl fmt::Display for ComicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row identifier of a user-defined category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page identifier combines the owning comic with the zero-based page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub comic: ComicId,
    pub index: u32,
}

/// Container format of a comic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComicKind {
    Zip,
    Rar,
    SevenZip,
    Pdf,
    /// A plain directory of page images.
    ImageFolder,
}

impl ComicKind {
    /// Classify a file by its extension. Directories are never classified here.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "cbz" | "zip" => Some(Self::Zip),
            "cbr" | "rar" => Some(Self::Rar),
            "cb7" | "7z" => Some(Self::SevenZip),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::Pdf => "pdf",
            Self::ImageFolder => "folder",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "zip" => Some(Self::Zip),
            "rar" => Some(Self::Rar),
            "7z" => Some(Self::SevenZip),
            "pdf" => Some(Self::Pdf),
            "folder" => Some(Self::ImageFolder),
            _ => None,
        }
    }
}

impl fmt::Display for ComicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image entry discovered inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Sanitised relative path, used for ordering and display.
    pub path: PathBuf,
    /// Raw name as stored in the archive, used for lookups.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub cache_key: String,
}

impl ImageKey {
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self { cache_key: cache_key.into() }
    }

    /// Key of a decoded page held by the viewer cache.
    pub fn for_page(page: &PageId) -> Self {
        Self::new(format!("comic:{}", page.comic.0)).derive(format!("page:{}", page.index))
    }

    /// Key of the cover thumbnail for the comic stored at `path`.
    pub fn for_cover(path: &Path) -> Self {
        Self::new("cover").derive(path.to_string_lossy())
    }

    /// Derive a child key by appending a suffix separated with `::`.
    pub fn derive(&self, suffix: impl AsRef<str>) -> Self {
        let mut derived = self.cache_key.clone();
        derived.push_str("::");
        derived.push_str(suffix.as_ref());
        Self { cache_key: derived }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBudget {
    pub bytes_max: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self { bytes_max: 256 * 1024 * 1024 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchPolicy {
    pub ahead: u32,
    pub behind: u32,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self { ahead: 3, behind: 1 }
    }
}

/// Token identifying an in-flight prefetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_comic_extensions() {
        assert_eq!(ComicKind::from_path(Path::new("a/b/Issue 1.CBZ")), Some(ComicKind::Zip));
        assert_eq!(ComicKind::from_path(Path::new("x.cbr")), Some(ComicKind::Rar));
        assert_eq!(ComicKind::from_path(Path::new("x.cb7")), Some(ComicKind::SevenZip));
        assert_eq!(ComicKind::from_path(Path::new("x.pdf")), Some(ComicKind::Pdf));
        assert_eq!(ComicKind::from_path(Path::new("x.png")), None);
        assert_eq!(ComicKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn kind_storage_names_round_trip() {
        for kind in [
            ComicKind::Zip,
            ComicKind::Rar,
            ComicKind::SevenZip,
            ComicKind::Pdf,
            ComicKind::ImageFolder,
        ] {
            assert_eq!(ComicKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ComicKind::parse("tar"), None);
    }

    #[test]
    fn page_keys_are_distinct_per_comic() {
        let a = ImageKey::for_page(&PageId { comic: ComicId(1), index: 2 });
        let b = ImageKey::for_page(&PageId { comic: ComicId(2), index: 2 });
        assert_eq!(a.cache_key, "comic:1::page:2");
        assert_ne!(a, b);
    }
}
