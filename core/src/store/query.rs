//! Paginated, filtered, and full-text searched comic listings.
//!
//! [`ComicQuery`] composes a `WHERE` clause from whichever filters are set and binds their
//! values positionally. Free-text search goes through the `comics_fts` index: each word of the
//! input becomes a quoted prefix term, and all terms must match.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::ShelfError;
use crate::types::CategoryId;

use super::comics::{COMIC_COLUMNS, Comic, comic_from_row};
use super::{Result, path_to_sql};

pub const DEFAULT_PAGE_SIZE: u32 = 30;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadFilter {
    #[default]
    Any,
    Read,
    Unread,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryFilter {
    #[default]
    Any,
    Uncategorized,
    Is(CategoryId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Title,
    Author,
    DateAdded,
    LastRead,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "title" => Some(Self::Title),
            "author" => Some(Self::Author),
            "added" | "date_added" | "date-added" => Some(Self::DateAdded),
            "read" | "last_read" | "last-read" => Some(Self::LastRead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Filter, sort, and pagination settings for listing comics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicQuery {
    pub favorites_only: bool,
    pub read: ReadFilter,
    pub new_only: bool,
    pub category: CategoryFilter,
    pub folder: Option<PathBuf>,
    pub search: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
    /// Zero-based page index.
    pub page: u32,
    pub page_size: u32,
}

impl Default for ComicQuery {
    fn default() -> Self {
        Self {
            favorites_only: false,
            read: ReadFilter::Any,
            new_only: false,
            category: CategoryFilter::Any,
            folder: None,
            search: None,
            sort: SortKey::Title,
            order: SortOrder::Ascending,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComicPage {
    pub items: Vec<Comic>,
    /// Number of comics matching the filters across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl ComicPage {
    pub fn has_next(&self) -> bool {
        (u64::from(self.page) + 1) * u64::from(self.page_size) < self.total
    }

    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size.max(1)))
    }
}

impl ComicQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn favorites_only(mut self, yes: bool) -> Self {
        self.favorites_only = yes;
        self
    }

    pub fn read(mut self, filter: ReadFilter) -> Self {
        self.read = filter;
        self
    }

    pub fn new_only(mut self, yes: bool) -> Self {
        self.new_only = yes;
        self
    }

    pub fn category(mut self, filter: CategoryFilter) -> Self {
        self.category = filter;
        self
    }

    pub fn folder(mut self, root: impl Into<PathBuf>) -> Self {
        self.folder = Some(root.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn sort(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort = key;
        self.order = order;
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn execute(&self, conn: &Connection) -> Result<ComicPage> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ShelfError::InvalidQuery(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            ))
            .into());
        }

        let (where_sql, mut values) = self.where_clause();

        let count_sql = format!("SELECT COUNT(*) FROM comics c{where_sql}");
        let total: i64 =
            conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;

        let offset = i64::from(self.page) * i64::from(self.page_size);
        let select_sql = format!(
            "SELECT {COMIC_COLUMNS} FROM comics c{where_sql} ORDER BY {} LIMIT ? OFFSET ?",
            self.order_by()
        );
        values.push(Value::Integer(i64::from(self.page_size)));
        values.push(Value::Integer(offset));

        let mut stmt = conn.prepare(&select_sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), comic_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ComicPage {
            items,
            total: total.max(0) as u64,
            page: self.page,
            page_size: self.page_size,
        })
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values = Vec::new();

        if self.favorites_only {
            clauses.push("c.is_favorite = 1");
        }
        match self.read {
            ReadFilter::Any => {}
            ReadFilter::Read => clauses.push("c.is_read = 1"),
            ReadFilter::Unread => clauses.push("c.is_read = 0"),
        }
        if self.new_only {
            clauses.push("c.is_new = 1");
        }
        match self.category {
            CategoryFilter::Any => {}
            CategoryFilter::Uncategorized => clauses.push("c.category_id IS NULL"),
            CategoryFilter::Is(id) => {
                clauses.push("c.category_id = ?");
                values.push(Value::Integer(id.0));
            }
        }
        if let Some(root) = self.folder.as_deref() {
            clauses.push("c.folder_root = ?");
            values.push(Value::Text(path_to_sql(root)));
        }
        if let Some(expr) = self.search.as_deref().and_then(fts_expression) {
            clauses.push("c.id IN (SELECT rowid FROM comics_fts WHERE comics_fts MATCH ?)");
            values.push(Value::Text(expr));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }

    fn order_by(&self) -> String {
        let dir = self.order.sql();
        match self.sort {
            SortKey::Title => format!("c.title COLLATE NOCASE {dir}, c.id {dir}"),
            SortKey::Author => format!(
                "c.author IS NULL, c.author COLLATE NOCASE {dir}, c.title COLLATE NOCASE {dir}, \
                 c.id {dir}"
            ),
            SortKey::DateAdded => format!("c.added_at_ms {dir}, c.id {dir}"),
            SortKey::LastRead => {
                format!("c.last_read_at_ms IS NULL, c.last_read_at_ms {dir}, c.id {dir}")
            }
        }
    }

    /// Restrict the query to comics under `root`.
    pub fn in_folder(root: &Path) -> Self {
        Self::default().folder(root)
    }
}

/// Turn free text into an FTS5 expression: alphanumeric runs become quoted prefix terms joined by
/// implicit AND. Returns `None` when the text holds no searchable characters.
pub fn fts_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{word}\"*"))
        .collect();
    if terms.is_empty() { None } else { Some(terms.join(" ")) }
}
