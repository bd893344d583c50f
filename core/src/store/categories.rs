//! User-defined categories.

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::ShelfError;
use crate::types::CategoryId;

use super::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub created_at_ms: i64,
    /// Number of comics currently assigned.
    pub comic_count: u32,
}

const SELECT_WITH_COUNTS: &str = "SELECT k.id, k.name, k.created_at_ms,
            (SELECT COUNT(*) FROM comics c WHERE c.category_id = k.id)
     FROM categories k";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId(row.get(0)?),
        name: row.get(1)?,
        created_at_ms: row.get(2)?,
        comic_count: row.get(3)?,
    })
}

fn normalise_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ShelfError::InvalidCategoryName.into());
    }
    Ok(name)
}

/// Fails with `DuplicateCategory` when another category already uses `name`, ignoring case.
fn ensure_unique(conn: &Connection, name: &str, except: Option<CategoryId>) -> Result<()> {
    let clash: Option<i64> = conn
        .query_row(
            "SELECT id FROM categories WHERE name = ?1 COLLATE NOCASE AND id IS NOT ?2",
            params![name, except.map(|id| id.0)],
            |row| row.get(0),
        )
        .optional()?;
    if clash.is_some() {
        return Err(ShelfError::DuplicateCategory(name.to_string()).into());
    }
    Ok(())
}

pub fn create(conn: &Connection, name: &str) -> Result<Category> {
    let name = normalise_name(name)?;
    ensure_unique(conn, name, None)?;

    conn.execute(
        "INSERT INTO categories (name, created_at_ms) VALUES (?1, ?2)",
        params![name, crate::now_ms()],
    )?;
    get(conn, CategoryId(conn.last_insert_rowid()))
}

pub fn rename(conn: &Connection, id: CategoryId, name: &str) -> Result<Category> {
    let name = normalise_name(name)?;
    if !exists(conn, id)? {
        return Err(ShelfError::CategoryNotFound(id).into());
    }
    ensure_unique(conn, name, Some(id))?;

    conn.execute("UPDATE categories SET name = ?1 WHERE id = ?2", params![name, id.0])?;
    get(conn, id)
}

/// Delete a category. Its comics become uncategorised through the foreign key.
pub fn delete(conn: &Connection, id: CategoryId) -> Result<()> {
    let changed = conn.execute("DELETE FROM categories WHERE id = ?1", params![id.0])?;
    if changed == 0 {
        return Err(ShelfError::CategoryNotFound(id).into());
    }
    Ok(())
}

pub fn get(conn: &Connection, id: CategoryId) -> Result<Category> {
    let sql = format!("{SELECT_WITH_COUNTS} WHERE k.id = ?1");
    conn.query_row(&sql, params![id.0], category_from_row)
        .optional()?
        .ok_or_else(|| ShelfError::CategoryNotFound(id).into())
}

/// All categories ordered by name, case-insensitively.
pub fn list(conn: &Connection) -> Result<Vec<Category>> {
    let sql = format!("{SELECT_WITH_COUNTS} ORDER BY k.name COLLATE NOCASE, k.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], category_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn exists(conn: &Connection, id: CategoryId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        params![id.0],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::shelf_error;
    use crate::store::comics::{self, tests::scanned};
    use crate::store::Database;

    #[test]
    fn names_are_trimmed_and_unique_ignoring_case() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();

        let manga = create(&conn, "  Manga ")?;
        assert_eq!(manga.name, "Manga");
        assert_eq!(manga.comic_count, 0);

        let err = create(&conn, "manga").unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::DuplicateCategory(_))));

        let err = create(&conn, "   ").unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::InvalidCategoryName)));
        Ok(())
    }

    #[test]
    fn rename_allows_changing_case_of_itself() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let manga = create(&conn, "manga")?;
        let western = create(&conn, "Western")?;

        assert_eq!(rename(&conn, manga.id, "Manga")?.name, "Manga");
        let err = rename(&conn, western.id, "MANGA").unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::DuplicateCategory(_))));

        let err = rename(&conn, CategoryId(99), "Other").unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::CategoryNotFound(CategoryId(99)))));
        Ok(())
    }

    #[test]
    fn list_is_sorted_and_counts_comics() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let western = create(&conn, "western")?;
        let manga = create(&conn, "Manga")?;

        let (a, _) = comics::upsert_scanned(&conn, &scanned("/library/a.cbz", "A"))?;
        let (b, _) = comics::upsert_scanned(&conn, &scanned("/library/b.cbz", "B"))?;
        comics::assign_category(&conn, a, Some(manga.id))?;
        comics::assign_category(&conn, b, Some(manga.id))?;

        let listed = list(&conn)?;
        let names: Vec<_> = listed.iter().map(|category| category.name.as_str()).collect();
        assert_eq!(names, ["Manga", "western"]);
        assert_eq!(listed[0].comic_count, 2);
        assert_eq!(get(&conn, western.id)?.comic_count, 0);
        Ok(())
    }

    #[test]
    fn deleting_a_category_uncategorises_its_comics() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let manga = create(&conn, "Manga")?;
        let (id, _) = comics::upsert_scanned(&conn, &scanned("/library/a.cbz", "A"))?;
        comics::assign_category(&conn, id, Some(manga.id))?;

        delete(&conn, manga.id)?;
        assert_eq!(comics::get(&conn, id)?.category_id, None);

        let err = delete(&conn, manga.id).unwrap_err();
        assert!(matches!(shelf_error(&err), Some(ShelfError::CategoryNotFound(_))));
        Ok(())
    }
}
