//! Comic rows: scan upserts, user flags, and reading progress.

use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::ShelfError;
use crate::types::{CategoryId, ComicId, ComicKind};

use super::{Result, categories, path_from_sql, path_to_sql};

/// Column list matching [`comic_from_row`], qualified with the `c` alias.
pub(crate) const COMIC_COLUMNS: &str = "c.id, c.path, c.folder_root, c.file_name, c.kind, \
     c.cover_path, c.title, c.author, c.series, c.page_count, c.file_size, c.file_modified_ms, \
     c.is_favorite, c.is_read, c.is_new, c.last_page, c.added_at_ms, c.updated_at_ms, \
     c.last_read_at_ms, c.category_id";

/// A catalogued comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comic {
    pub id: ComicId,
    pub path: PathBuf,
    /// Granted folder the comic was discovered under.
    pub folder_root: PathBuf,
    pub file_name: String,
    pub kind: ComicKind,
    pub cover_path: Option<PathBuf>,
    pub title: String,
    pub author: Option<String>,
    pub series: Option<String>,
    /// Known once the comic has been opened at least once.
    pub page_count: Option<u32>,
    pub file_size: u64,
    pub file_modified_ms: i64,
    pub is_favorite: bool,
    pub is_read: bool,
    pub is_new: bool,
    /// Zero-based index of the last page shown.
    pub last_page: u32,
    pub added_at_ms: i64,
    pub updated_at_ms: i64,
    pub last_read_at_ms: Option<i64>,
    pub category_id: Option<CategoryId>,
}

/// File facts and metadata produced by a folder scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedComic {
    pub path: PathBuf,
    pub folder_root: PathBuf,
    pub kind: ComicKind,
    pub file_size: u64,
    pub file_modified_ms: i64,
    pub title: String,
    pub author: Option<String>,
    pub series: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Size or modification time changed since the last scan.
    Updated,
    Unchanged,
}

pub(crate) fn comic_from_row(row: &Row<'_>) -> rusqlite::Result<Comic> {
    let kind: String = row.get(4)?;
    let kind = ComicKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown comic kind {kind:?}").into(),
        )
    })?;

    Ok(Comic {
        id: ComicId(row.get(0)?),
        path: path_from_sql(row.get(1)?),
        folder_root: path_from_sql(row.get(2)?),
        file_name: row.get(3)?,
        kind,
        cover_path: row.get::<_, Option<String>>(5)?.map(path_from_sql),
        title: row.get(6)?,
        author: row.get(7)?,
        series: row.get(8)?,
        page_count: row.get(9)?,
        file_size: row.get::<_, i64>(10)?.max(0) as u64,
        file_modified_ms: row.get(11)?,
        is_favorite: row.get(12)?,
        is_read: row.get(13)?,
        is_new: row.get(14)?,
        last_page: row.get(15)?,
        added_at_ms: row.get(16)?,
        updated_at_ms: row.get(17)?,
        last_read_at_ms: row.get(18)?,
        category_id: row.get::<_, Option<i64>>(19)?.map(CategoryId),
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Insert a newly discovered comic or refresh the file facts of a known one. Favourite, read,
/// and new flags, the category, and reading progress of an existing row are left untouched.
pub fn upsert_scanned(
    conn: &Connection,
    scanned: &ScannedComic,
) -> Result<(ComicId, UpsertOutcome)> {
    let path = path_to_sql(&scanned.path);
    let root = path_to_sql(&scanned.folder_root);
    let now = crate::now_ms();

    let existing = conn
        .query_row(
            "SELECT id, file_size, file_modified_ms FROM comics WHERE path = ?1",
            params![path],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )
        .optional()?;

    let Some((id, size, modified)) = existing else {
        conn.execute(
            "INSERT INTO comics (path, folder_root, file_name, kind, title, author, series,
                                 file_size, file_modified_ms, is_new, added_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
            params![
                path,
                root,
                file_name_of(&scanned.path),
                scanned.kind.as_str(),
                scanned.title,
                scanned.author,
                scanned.series,
                scanned.file_size as i64,
                scanned.file_modified_ms,
                now,
            ],
        )?;
        return Ok((ComicId(conn.last_insert_rowid()), UpsertOutcome::Inserted));
    };

    if size == scanned.file_size as i64 && modified == scanned.file_modified_ms {
        conn.execute(
            "UPDATE comics SET folder_root = ?1 WHERE id = ?2 AND folder_root <> ?1",
            params![root, id],
        )?;
        return Ok((ComicId(id), UpsertOutcome::Unchanged));
    }

    conn.execute(
        "UPDATE comics
         SET folder_root = ?1, kind = ?2, title = ?3, author = ?4, series = ?5,
             file_size = ?6, file_modified_ms = ?7, page_count = NULL, updated_at_ms = ?8
         WHERE id = ?9",
        params![
            root,
            scanned.kind.as_str(),
            scanned.title,
            scanned.author,
            scanned.series,
            scanned.file_size as i64,
            scanned.file_modified_ms,
            now,
            id,
        ],
    )?;
    Ok((ComicId(id), UpsertOutcome::Updated))
}

pub fn get(conn: &Connection, id: ComicId) -> Result<Comic> {
    let sql = format!("SELECT {COMIC_COLUMNS} FROM comics c WHERE c.id = ?1");
    conn.query_row(&sql, params![id.0], comic_from_row)
        .optional()?
        .ok_or_else(|| ShelfError::ComicNotFound(id).into())
}

pub fn find_by_path(conn: &Connection, path: &Path) -> Result<Option<Comic>> {
    let sql = format!("SELECT {COMIC_COLUMNS} FROM comics c WHERE c.path = ?1");
    Ok(conn.query_row(&sql, params![path_to_sql(path)], comic_from_row).optional()?)
}

fn expect_changed(changed: usize, id: ComicId) -> Result<()> {
    if changed == 0 {
        return Err(ShelfError::ComicNotFound(id).into());
    }
    Ok(())
}

pub fn set_favorite(conn: &Connection, id: ComicId, favorite: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE comics SET is_favorite = ?1, updated_at_ms = ?2 WHERE id = ?3",
        params![favorite, crate::now_ms(), id.0],
    )?;
    expect_changed(changed, id)
}

/// Flip the favourite flag and return its new value.
pub fn toggle_favorite(conn: &Connection, id: ComicId) -> Result<bool> {
    conn.query_row(
        "UPDATE comics SET is_favorite = 1 - is_favorite, updated_at_ms = ?1 WHERE id = ?2
         RETURNING is_favorite",
        params![crate::now_ms(), id.0],
        |row| row.get::<_, bool>(0),
    )
    .optional()?
    .ok_or_else(|| ShelfError::ComicNotFound(id).into())
}

/// Marking a comic read also clears its new flag.
pub fn set_read(conn: &Connection, id: ComicId, read: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE comics
         SET is_read = ?1, is_new = CASE WHEN ?1 THEN 0 ELSE is_new END, updated_at_ms = ?2
         WHERE id = ?3",
        params![read, crate::now_ms(), id.0],
    )?;
    expect_changed(changed, id)
}

pub fn mark_seen(conn: &Connection, id: ComicId) -> Result<()> {
    let changed = conn.execute(
        "UPDATE comics SET is_new = 0, updated_at_ms = ?1 WHERE id = ?2",
        params![crate::now_ms(), id.0],
    )?;
    expect_changed(changed, id)
}

/// Move a comic into `category`, or out of any category with `None`.
pub fn assign_category(
    conn: &Connection,
    id: ComicId,
    category: Option<CategoryId>,
) -> Result<()> {
    if let Some(category) = category {
        if !categories::exists(conn, category)? {
            return Err(ShelfError::CategoryNotFound(category).into());
        }
    }
    let changed = conn.execute(
        "UPDATE comics SET category_id = ?1, updated_at_ms = ?2 WHERE id = ?3",
        params![category.map(|category| category.0), crate::now_ms(), id.0],
    )?;
    expect_changed(changed, id)
}

/// Remember `page` as the last page shown. Reaching the final page marks the comic read.
pub fn record_progress(conn: &Connection, id: ComicId, page: u32) -> Result<()> {
    let changed = conn.execute(
        "UPDATE comics
         SET last_page = ?1,
             last_read_at_ms = ?2,
             updated_at_ms = ?2,
             is_new = 0,
             is_read = CASE
                 WHEN page_count IS NOT NULL AND ?1 + 1 >= page_count THEN 1
                 ELSE is_read
             END
         WHERE id = ?3",
        params![page, crate::now_ms(), id.0],
    )?;
    expect_changed(changed, id)
}

pub fn set_page_count(conn: &Connection, id: ComicId, page_count: u32) -> Result<()> {
    let changed = conn.execute(
        "UPDATE comics SET page_count = ?1 WHERE id = ?2",
        params![page_count, id.0],
    )?;
    expect_changed(changed, id)
}

pub fn set_cover(conn: &Connection, id: ComicId, cover: Option<&Path>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE comics SET cover_path = ?1 WHERE id = ?2",
        params![cover.map(path_to_sql), id.0],
    )?;
    expect_changed(changed, id)
}

/// Every comic recorded under a granted folder, as `(id, path)` pairs.
pub fn paths_under_root(conn: &Connection, root: &Path) -> Result<Vec<(ComicId, PathBuf)>> {
    let mut stmt = conn.prepare("SELECT id, path FROM comics WHERE folder_root = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![path_to_sql(root)], |row| {
        Ok((ComicId(row.get(0)?), path_from_sql(row.get(1)?)))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete a comic and return the removed row.
pub fn delete(conn: &Connection, id: ComicId) -> Result<Comic> {
    let comic = get(conn, id)?;
    conn.execute("DELETE FROM comics WHERE id = ?1", params![id.0])?;
    Ok(comic)
}

/// Delete several comics in one transaction and return the rows that existed.
pub fn delete_many(conn: &Connection, ids: &[ComicId]) -> Result<Vec<Comic>> {
    let tx = conn.unchecked_transaction()?;
    let mut removed = Vec::with_capacity(ids.len());
    {
        let sql = format!("SELECT {COMIC_COLUMNS} FROM comics c WHERE c.id = ?1");
        let mut select = tx.prepare(&sql)?;
        let mut delete = tx.prepare("DELETE FROM comics WHERE id = ?1")?;
        for id in ids {
            if let Some(comic) = select.query_row(params![id.0], comic_from_row).optional()? {
                delete.execute(params![id.0])?;
                removed.push(comic);
            }
        }
    }
    tx.commit()?;
    Ok(removed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::shelf_error;
    use crate::store::Database;

    pub(crate) fn scanned(path: &str, title: &str) -> ScannedComic {
        ScannedComic {
            path: PathBuf::from(path),
            folder_root: PathBuf::from("/library"),
            kind: ComicKind::from_path(Path::new(path)).unwrap_or(ComicKind::ImageFolder),
            file_size: 1_000,
            file_modified_ms: 1_700_000_000_000,
            title: title.to_string(),
            author: None,
            series: None,
        }
    }

    #[test]
    fn upsert_inserts_then_reports_unchanged() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let scan = scanned("/library/Saga/Saga 01.cbz", "Saga 01");

        let (id, outcome) = upsert_scanned(&conn, &scan)?;
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let comic = get(&conn, id)?;
        assert_eq!(comic.file_name, "Saga 01.cbz");
        assert_eq!(comic.kind, ComicKind::Zip);
        assert!(comic.is_new);
        assert!(!comic.is_favorite);

        assert_eq!(upsert_scanned(&conn, &scan)?, (id, UpsertOutcome::Unchanged));
        Ok(())
    }

    #[test]
    fn rescanning_a_changed_file_keeps_user_state() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let mut scan = scanned("/library/Saga 02.cbz", "Saga 02");
        let (id, _) = upsert_scanned(&conn, &scan)?;

        set_favorite(&conn, id, true)?;
        set_page_count(&conn, id, 20)?;
        record_progress(&conn, id, 4)?;

        scan.file_size = 2_000;
        scan.title = "Saga Chapter Two".into();
        assert_eq!(upsert_scanned(&conn, &scan)?, (id, UpsertOutcome::Updated));

        let comic = get(&conn, id)?;
        assert_eq!(comic.title, "Saga Chapter Two");
        assert_eq!(comic.file_size, 2_000);
        assert!(comic.is_favorite);
        assert!(!comic.is_new);
        assert_eq!(comic.last_page, 4);
        assert_eq!(comic.page_count, None);
        Ok(())
    }

    #[test]
    fn progress_on_last_page_marks_read() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let (id, _) = upsert_scanned(&conn, &scanned("/library/a.cbz", "A"))?;
        set_page_count(&conn, id, 3)?;

        record_progress(&conn, id, 1)?;
        let comic = get(&conn, id)?;
        assert!(!comic.is_read);
        assert!(!comic.is_new);
        assert!(comic.last_read_at_ms.is_some());

        record_progress(&conn, id, 2)?;
        assert!(get(&conn, id)?.is_read);
        Ok(())
    }

    #[test]
    fn toggling_and_flags() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let (id, _) = upsert_scanned(&conn, &scanned("/library/b.cbz", "B"))?;

        assert!(toggle_favorite(&conn, id)?);
        assert!(!toggle_favorite(&conn, id)?);

        set_read(&conn, id, true)?;
        let comic = get(&conn, id)?;
        assert!(comic.is_read && !comic.is_new);

        set_read(&conn, id, false)?;
        assert!(!get(&conn, id)?.is_read);
        Ok(())
    }

    #[test]
    fn missing_comics_are_reported() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let err = toggle_favorite(&conn, ComicId(404)).unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::ComicNotFound(ComicId(404)))));

        let err = mark_seen(&conn, ComicId(404)).unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::ComicNotFound(_))));
        Ok(())
    }

    #[test]
    fn assigning_an_unknown_category_fails() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let (id, _) = upsert_scanned(&conn, &scanned("/library/c.cbz", "C"))?;
        let err = assign_category(&conn, id, Some(CategoryId(9))).unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::CategoryNotFound(CategoryId(9)))));
        Ok(())
    }

    #[test]
    fn deleting_and_listing_by_root() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let (a, _) = upsert_scanned(&conn, &scanned("/library/a.cbz", "A"))?;
        let (b, _) = upsert_scanned(&conn, &scanned("/library/b.cbz", "B"))?;
        let (c, _) = upsert_scanned(&conn, &scanned("/library/c.cbz", "C"))?;
        set_cover(&conn, a, Some(Path::new("/covers/a.jpg")))?;

        let listed = paths_under_root(&conn, Path::new("/library"))?;
        assert_eq!(listed.len(), 3);

        let removed = delete(&conn, a)?;
        assert_eq!(removed.cover_path, Some(PathBuf::from("/covers/a.jpg")));

        let removed = delete_many(&conn, &[b, ComicId(77), c])?;
        assert_eq!(removed.len(), 2);
        assert!(paths_under_root(&conn, Path::new("/library"))?.is_empty());
        assert!(find_by_path(&conn, Path::new("/library/b.cbz"))?.is_none());
        Ok(())
    }
}
