//! Folders the user has granted the shelf access to.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::ShelfError;

use super::comics::{COMIC_COLUMNS, Comic, comic_from_row};
use super::{Result, path_from_sql, path_to_sql};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantedFolder {
    pub id: i64,
    /// Canonical absolute path of the folder.
    pub root: PathBuf,
    pub granted_at_ms: i64,
    pub last_scan_ms: Option<i64>,
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<GrantedFolder> {
    Ok(GrantedFolder {
        id: row.get(0)?,
        root: path_from_sql(row.get(1)?),
        granted_at_ms: row.get(2)?,
        last_scan_ms: row.get(3)?,
    })
}

/// Canonicalise a directory path, failing with `NotADirectory` when it cannot be used as a root.
pub fn canonical_root(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(root) if root.is_dir() => Ok(root),
        _ => Err(ShelfError::NotADirectory(path.to_path_buf()).into()),
    }
}

/// Record access to a directory. Granting an already granted folder returns the existing row.
pub fn grant(conn: &Connection, path: &Path) -> Result<GrantedFolder> {
    let root = canonical_root(path)?;
    conn.execute(
        "INSERT OR IGNORE INTO folders (root, granted_at_ms) VALUES (?1, ?2)",
        params![path_to_sql(&root), crate::now_ms()],
    )?;
    find(conn, &root)?.ok_or_else(|| ShelfError::FolderNotGranted(root).into())
}

/// Forget a granted folder. With `purge` its comics are deleted too and returned.
pub fn revoke(conn: &Connection, root: &Path, purge: bool) -> Result<Vec<Comic>> {
    let Some(folder) = find(conn, root)? else {
        return Err(ShelfError::FolderNotGranted(root.to_path_buf()).into());
    };
    let root = path_to_sql(&folder.root);

    let tx = conn.unchecked_transaction()?;
    let mut removed = Vec::new();
    if purge {
        let sql = format!("SELECT {COMIC_COLUMNS} FROM comics c WHERE c.folder_root = ?1");
        {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params![root], comic_from_row)?;
            removed = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        }
        tx.execute("DELETE FROM comics WHERE folder_root = ?1", params![root])?;
    }
    tx.execute("DELETE FROM folders WHERE id = ?1", params![folder.id])?;
    tx.commit()?;
    Ok(removed)
}

pub fn list(conn: &Connection) -> Result<Vec<GrantedFolder>> {
    let mut stmt = conn.prepare(
        "SELECT id, root, granted_at_ms, last_scan_ms FROM folders ORDER BY root",
    )?;
    let rows = stmt.query_map([], folder_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find(conn: &Connection, root: &Path) -> Result<Option<GrantedFolder>> {
    Ok(conn
        .query_row(
            "SELECT id, root, granted_at_ms, last_scan_ms FROM folders WHERE root = ?1",
            params![path_to_sql(root)],
            folder_from_row,
        )
        .optional()?)
}

pub fn is_granted(conn: &Connection, root: &Path) -> Result<bool> {
    Ok(find(conn, root)?.is_some())
}

pub fn mark_scanned(conn: &Connection, root: &Path, at_ms: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE folders SET last_scan_ms = ?1 WHERE root = ?2",
        params![at_ms, path_to_sql(root)],
    )?;
    if changed == 0 {
        return Err(ShelfError::FolderNotGranted(root.to_path_buf()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::shelf_error;
    use crate::store::Database;
    use crate::store::comics::{self, ScannedComic};
    use crate::types::ComicKind;

    #[test]
    fn grant_canonicalises_and_is_idempotent() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir(temp.path().join("comics"))?;
        let db = Database::open_in_memory()?;
        let conn = db.conn();

        let first = grant(&conn, &temp.path().join("comics").join("..").join("comics"))?;
        let second = grant(&conn, &temp.path().join("comics"))?;
        assert_eq!(first, second);
        assert_eq!(first.root, fs::canonicalize(temp.path().join("comics"))?);
        assert!(is_granted(&conn, &first.root)?);
        assert_eq!(list(&conn)?.len(), 1);
        Ok(())
    }

    #[test]
    fn files_and_missing_paths_cannot_be_granted() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("issue.cbz");
        fs::write(&file, b"zip")?;
        let db = Database::open_in_memory()?;
        let conn = db.conn();

        for path in [file, temp.path().join("absent")] {
            let err = grant(&conn, &path).unwrap_err();
            assert!(matches!(shelf_error(&err), Some(ShelfError::NotADirectory(_))));
        }
        Ok(())
    }

    #[test]
    fn revoke_with_purge_removes_comics() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let folder = grant(&conn, temp.path())?;

        let scanned = ScannedComic {
            path: folder.root.join("a.cbz"),
            folder_root: folder.root.clone(),
            kind: ComicKind::Zip,
            file_size: 10,
            file_modified_ms: 0,
            title: "A".into(),
            author: None,
            series: None,
        };
        comics::upsert_scanned(&conn, &scanned)?;
        mark_scanned(&conn, &folder.root, 42)?;
        assert_eq!(find(&conn, &folder.root)?.and_then(|f| f.last_scan_ms), Some(42));

        let removed = revoke(&conn, &folder.root, true)?;
        assert_eq!(removed.len(), 1);
        assert!(!is_granted(&conn, &folder.root)?);
        assert!(comics::find_by_path(&conn, &scanned.path)?.is_none());

        let err = revoke(&conn, &folder.root, false).unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::FolderNotGranted(_))));
        Ok(())
    }
}
