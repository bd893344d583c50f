//! Recursive discovery of comics below a granted folder.
//!
//! The walk never aborts on a single bad entry: unreadable directories, dangling links, and
//! files whose metadata cannot be read are logged and counted in [`ScanOutcome::skipped`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::ShelfError;
use crate::types::ComicKind;

use super::{Result, util};

/// Tuning knobs for [`scan_tree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Follow symbolic links while walking.
    pub follow_links: bool,
    /// Maximum directory depth below the root; `None` walks the whole tree.
    pub max_depth: Option<usize>,
    /// Treat directories that directly contain page images as comics.
    pub image_folders: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { follow_links: false, max_depth: None, image_folders: true }
    }
}

/// A comic found on disk, before it is reconciled with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredComic {
    pub path: PathBuf,
    pub kind: ComicKind,
    pub size_bytes: u64,
    pub modified_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub comics: Vec<DiscoveredComic>,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct ImageDirStats {
    images: usize,
    size_bytes: u64,
    modified_ms: i64,
}

/// Walk `root` and classify every comic below it.
pub fn scan_tree(root: &Path, options: &ScanOptions) -> Result<ScanOutcome> {
    if !root.is_dir() {
        return Err(ShelfError::NotADirectory(root.to_path_buf()).into());
    }

    let mut walker = WalkDir::new(root).follow_links(options.follow_links);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut outcome = ScanOutcome::default();
    let mut image_dirs: BTreeMap<PathBuf, ImageDirStats> = BTreeMap::new();

    let entries = walker.into_iter().filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));
    for result in entries {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!(root = %root.display(), "skipping unreadable entry: {err}");
                outcome.skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let kind = ComicKind::from_path(path);
        let image_page = kind.is_none() && options.image_folders && util::is_supported_image(path);
        if kind.is_none() && !image_page {
            continue;
        }

        let (size_bytes, modified_ms) = match file_facts(&entry) {
            Ok(facts) => facts,
            Err(err) => {
                warn!(path = %path.display(), "skipping file without metadata: {err}");
                outcome.skipped += 1;
                continue;
            }
        };

        if let Some(kind) = kind {
            debug!(path = %path.display(), %kind, "discovered comic");
            outcome.comics.push(DiscoveredComic {
                path: path.to_path_buf(),
                kind,
                size_bytes,
                modified_ms,
            });
        } else if let Some(parent) = path.parent() {
            let stats = image_dirs.entry(parent.to_path_buf()).or_default();
            stats.images += 1;
            stats.size_bytes += size_bytes;
            stats.modified_ms = stats.modified_ms.max(modified_ms);
        }
    }

    for (dir, stats) in image_dirs {
        debug!(path = %dir.display(), pages = stats.images, "discovered image folder");
        outcome.comics.push(DiscoveredComic {
            path: dir,
            kind: ComicKind::ImageFolder,
            size_bytes: stats.size_bytes,
            modified_ms: stats.modified_ms,
        });
    }

    outcome.comics.sort_by(|a, b| util::natural_cmp_path(&a.path, &b.path));
    Ok(outcome)
}

fn is_skipped(entry: &DirEntry) -> bool {
    let path = entry.path();
    util::is_hidden(path) || (entry.file_type().is_dir() && util::is_junk_dir(path))
}

fn file_facts(entry: &DirEntry) -> Result<(u64, i64)> {
    let metadata = entry.metadata()?;
    let modified_ms = metadata.modified().map(crate::millis_since_epoch).unwrap_or_default();
    Ok((metadata.len(), modified_ms))
}
