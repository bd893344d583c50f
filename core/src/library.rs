//! Use cases over the catalogue: folder grants and scans, comic and category edits, and opening
//! comics for reading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::cache::DiskCache;
use crate::codec::{DecodedImage, decode_page, encode_jpeg};
use crate::config::ShelfConfig;
use crate::error::ShelfError;
use crate::fs::{DiscoveredComic, archive, folder, scan_tree};
use crate::meta::{ComicInfo, display_title};
use crate::pipeline::resize::shrink_to_fit;
use crate::stats::StatsCollector;
use crate::store::{
    Category, Comic, ComicPage, ComicQuery, Database, GrantedFolder, ScannedComic, UpsertOutcome,
    categories, comics, folders,
};
use crate::types::{CategoryId, ComicId, ComicKind, ImageKey};
use crate::viewer::{ComicViewer, ViewerOptions, open_source};

/// Totals of one folder scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub discovered: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Catalogued comics whose files no longer exist.
    pub removed: usize,
    /// Entries the walk could not read.
    pub skipped: usize,
}

/// Entry point for everything the shell does with the shelf.
#[derive(Debug)]
pub struct Library {
    config: ShelfConfig,
    db: Database,
    covers: DiskCache,
    stats: Arc<StatsCollector>,
}

impl Library {
    /// Open the catalogue and cover store under the configured data directory.
    pub fn open(config: &ShelfConfig) -> Result<Self> {
        let db = Database::open(&config.database_path())?;
        let covers = DiskCache::new(config.cover_dir())?;
        Ok(Self::with_parts(config.clone(), db, covers))
    }

    /// Catalogue held in memory; covers still go to `cover_dir`.
    pub fn in_memory(cover_dir: &Path, config: ShelfConfig) -> Result<Self> {
        let db = Database::open_in_memory()?;
        let covers = DiskCache::new(cover_dir)?;
        Ok(Self::with_parts(config, db, covers))
    }

    fn with_parts(config: ShelfConfig, db: Database, covers: DiskCache) -> Self {
        Self { config, db, covers, stats: Arc::new(StatsCollector::new()) }
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn stats(&self) -> Arc<StatsCollector> {
        Arc::clone(&self.stats)
    }

    // Folders

    pub fn grant_folder(&self, path: &Path) -> Result<GrantedFolder> {
        let folder = folders::grant(&self.db.conn(), path)?;
        info!(root = %folder.root.display(), "granted folder");
        Ok(folder)
    }

    /// Forget a folder. With `purge` its comics and their covers are removed as well; returns
    /// the number of comics removed.
    pub fn revoke_folder(&self, path: &Path, purge: bool) -> Result<usize> {
        let root = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let removed = folders::revoke(&self.db.conn(), &root, purge)?;
        self.discard_covers(&removed);
        info!(root = %root.display(), removed = removed.len(), "revoked folder");
        Ok(removed.len())
    }

    pub fn folders(&self) -> Result<Vec<GrantedFolder>> {
        folders::list(&self.db.conn())
    }

    // Scanning

    /// Reconcile the catalogue with the comics currently below a granted folder.
    pub fn scan_folder(&self, path: &Path) -> Result<ScanReport> {
        let root = folders::canonical_root(path)?;
        if !folders::is_granted(&self.db.conn(), &root)? {
            return Err(ShelfError::FolderNotGranted(root).into());
        }

        let outcome = scan_tree(&root, &self.config.scan)?;
        let mut report = ScanReport {
            discovered: outcome.comics.len(),
            skipped: outcome.skipped,
            ..ScanReport::default()
        };

        let mut seen = HashSet::with_capacity(outcome.comics.len());
        for discovered in &outcome.comics {
            seen.insert(discovered.path.clone());
            match self.reconcile(&root, discovered)? {
                UpsertOutcome::Inserted => report.added += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }

        if outcome.skipped > 0 {
            warn!(
                root = %root.display(),
                skipped = outcome.skipped,
                "incomplete walk; only pruning comics missing from disk"
            );
        }
        let removed = {
            let conn = self.db.conn();
            let known = comics::paths_under_root(&conn, &root)?;
            let vanished = vanished_comics(known, &seen, outcome.skipped == 0);
            let removed = comics::delete_many(&conn, &vanished)?;
            folders::mark_scanned(&conn, &root, crate::now_ms())?;
            removed
        };
        self.discard_covers(&removed);
        report.removed = removed.len();

        self.stats.record_scan(&report);
        info!(
            root = %root.display(),
            discovered = report.discovered,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            skipped = report.skipped,
            "scan finished"
        );
        Ok(report)
    }

    /// Scan every granted folder. A folder that fails is logged and left out of the result.
    pub fn scan_all(&self) -> Result<Vec<(PathBuf, ScanReport)>> {
        let mut reports = Vec::new();
        for folder in self.folders()? {
            match self.scan_folder(&folder.root) {
                Ok(report) => reports.push((folder.root, report)),
                Err(err) => warn!(root = %folder.root.display(), error = ?err, "scan failed"),
            }
        }
        Ok(reports)
    }

    fn reconcile(&self, root: &Path, discovered: &DiscoveredComic) -> Result<UpsertOutcome> {
        let existing = comics::find_by_path(&self.db.conn(), &discovered.path)?;
        let unchanged = existing.as_ref().is_some_and(|comic| {
            comic.file_size == discovered.size_bytes
                && comic.file_modified_ms == discovered.modified_ms
        });

        let (title, author, series) = match existing.as_ref().filter(|_| unchanged) {
            Some(comic) => (comic.title.clone(), comic.author.clone(), comic.series.clone()),
            None => {
                let info = self.comic_info(discovered);
                let title = display_title(info.as_ref(), &discovered.path);
                let info = info.unwrap_or_default();
                (title, info.writer, info.series)
            }
        };

        let scanned = ScannedComic {
            path: discovered.path.clone(),
            folder_root: root.to_path_buf(),
            kind: discovered.kind,
            file_size: discovered.size_bytes,
            file_modified_ms: discovered.modified_ms,
            title,
            author,
            series,
        };
        let (id, outcome) = comics::upsert_scanned(&self.db.conn(), &scanned)?;

        let has_cover = existing.as_ref().is_some_and(|comic| comic.cover_path.is_some());
        if outcome != UpsertOutcome::Unchanged || !has_cover {
            self.refresh_cover(id, discovered);
        }
        debug!(path = %discovered.path.display(), ?outcome, "reconciled comic");
        Ok(outcome)
    }

    fn comic_info(&self, discovered: &DiscoveredComic) -> Option<ComicInfo> {
        if discovered.kind != ComicKind::Zip {
            return None;
        }
        let read = || -> Result<Option<ComicInfo>> {
            let mut handle = archive::open_archive(&discovered.path)?;
            match archive::read_comic_info(&mut handle)? {
                Some(bytes) => Ok(Some(crate::meta::parse_bytes(&bytes)?)),
                None => Ok(None),
            }
        };
        read().unwrap_or_else(|err| {
            let path = discovered.path.display();
            warn!(path = %path, error = ?err, "ignoring unreadable ComicInfo.xml");
            None
        })
    }

    fn refresh_cover(&self, id: ComicId, discovered: &DiscoveredComic) {
        match self.render_cover(discovered) {
            Ok(Some(cover)) => {
                if let Err(err) = comics::set_cover(&self.db.conn(), id, Some(&cover)) {
                    warn!(comic = %id, error = ?err, "recording cover failed");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path = %discovered.path.display(), error = ?err, "cover extraction failed");
            }
        }
    }

    /// Thumbnail of the first page written to the cover store.
    fn render_cover(&self, discovered: &DiscoveredComic) -> Result<Option<PathBuf>> {
        let Some(first) = first_page(&discovered.path, discovered.kind)? else {
            return Ok(None);
        };
        let thumbnail = shrink_to_fit(first, self.config.thumbnail.bounds())?;
        let jpeg = encode_jpeg(&thumbnail, self.config.thumbnail.quality)?;
        let path = self.covers.write(&ImageKey::for_cover(&discovered.path), &jpeg)?;
        Ok(Some(path))
    }

    fn discard_covers(&self, removed: &[Comic]) {
        for cover in removed.iter().filter_map(|comic| comic.cover_path.as_deref()) {
            if let Err(err) = self.covers.remove_path(cover) {
                warn!(cover = %cover.display(), error = ?err, "removing cover failed");
            }
        }
    }

    // Comics

    pub fn comic(&self, id: ComicId) -> Result<Comic> {
        comics::get(&self.db.conn(), id)
    }

    pub fn query(&self, query: &ComicQuery) -> Result<ComicPage> {
        query.execute(&self.db.conn())
    }

    pub fn toggle_favorite(&self, id: ComicId) -> Result<bool> {
        comics::toggle_favorite(&self.db.conn(), id)
    }

    pub fn set_favorite(&self, id: ComicId, favorite: bool) -> Result<()> {
        comics::set_favorite(&self.db.conn(), id, favorite)
    }

    pub fn set_read(&self, id: ComicId, read: bool) -> Result<()> {
        comics::set_read(&self.db.conn(), id, read)
    }

    pub fn mark_seen(&self, id: ComicId) -> Result<()> {
        comics::mark_seen(&self.db.conn(), id)
    }

    pub fn assign_category(&self, id: ComicId, category: Option<CategoryId>) -> Result<()> {
        comics::assign_category(&self.db.conn(), id, category)
    }

    /// Remember the page being read. Pages beyond a known page count are rejected.
    pub fn record_progress(&self, id: ComicId, page: u32) -> Result<()> {
        let conn = self.db.conn();
        if let Some(count) = comics::get(&conn, id)?.page_count {
            if page >= count {
                return Err(ShelfError::PageOutOfRange { index: page, count }.into());
            }
        }
        comics::record_progress(&conn, id, page)
    }

    /// Drop a comic from the catalogue. The file itself is left alone.
    pub fn remove_comic(&self, id: ComicId) -> Result<Comic> {
        let removed = comics::delete(&self.db.conn(), id)?;
        self.discard_covers(std::slice::from_ref(&removed));
        Ok(removed)
    }

    // Categories

    pub fn create_category(&self, name: &str) -> Result<Category> {
        categories::create(&self.db.conn(), name)
    }

    pub fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category> {
        categories::rename(&self.db.conn(), id, name)
    }

    pub fn delete_category(&self, id: CategoryId) -> Result<()> {
        categories::delete(&self.db.conn(), id)
    }

    pub fn category(&self, id: CategoryId) -> Result<Category> {
        categories::get(&self.db.conn(), id)
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        categories::list(&self.db.conn())
    }

    // Reading

    /// Open a comic for reading and record its page count.
    pub fn open_viewer(&self, id: ComicId) -> Result<ComicViewer> {
        let comic = self.comic(id)?;
        let source = open_source(&comic.path, comic.kind)?;

        let count = source.page_count();
        if comic.page_count != Some(count) {
            comics::set_page_count(&self.db.conn(), id, count)?;
        }

        let options = ViewerOptions::from_config(&self.config);
        Ok(ComicViewer::new(id, source, options, self.stats()))
    }
}

/// Decoded first page of a comic, or `None` for empty comics and formats without page access.
fn first_page(path: &Path, kind: ComicKind) -> Result<Option<DecodedImage>> {
    match kind {
        ComicKind::Zip => match archive::read_first_page(path)? {
            Some((entry, bytes)) => Ok(Some(decode_page(&entry.path, &bytes)?)),
            None => Ok(None),
        },
        ComicKind::ImageFolder => match folder::collect_entries(path)?.into_iter().next() {
            Some(rel) => {
                let bytes = folder::read_page(path, &rel)?;
                Ok(Some(decode_page(&rel, &bytes)?))
            }
            None => Ok(None),
        },
        #[cfg(feature = "pdf")]
        ComicKind::Pdf => {
            let width = crate::fs::pdf::DEFAULT_RENDER_WIDTH / 2;
            Ok(Some(crate::fs::pdf::render_page(path, 0, width)?))
        }
        _ => Ok(None),
    }
}

/// Catalogued comics under a scanned root that the walk did not see. After an incomplete walk
/// only rows whose path is confirmed gone from disk qualify.
fn vanished_comics(
    known: Vec<(ComicId, PathBuf)>,
    seen: &HashSet<PathBuf>,
    walk_complete: bool,
) -> Vec<ComicId> {
    known
        .into_iter()
        .filter(|(_, path)| !seen.contains(path))
        .filter(|(_, path)| walk_complete || matches!(path.try_exists(), Ok(false)))
        .map(|(id, _)| id)
        .collect()
}
