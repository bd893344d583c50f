//! Connection ownership and schema migrations.

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use super::Result;

/// Highest schema version this build knows how to read.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

const INITIAL_SCHEMA: &str = include_str!("schema.sql");

/// Single SQLite connection shared behind a lock.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the catalogue at `path` and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("configuring database connection")?;

        info!(path = %path.display(), "opened catalogue");
        Self::from_connection(conn)
    }

    /// Private in-memory catalogue, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Lock the connection for the duration of the returned guard.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    pub fn schema_version(&self) -> Result<i32> {
        schema_version(&self.conn())
    }

    /// Run SQLite's `integrity_check` and fail unless it reports `ok`.
    pub fn integrity_check(&self) -> Result<()> {
        let result: String =
            self.conn().query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result != "ok" {
            bail!("database integrity check failed: {result}");
        }
        Ok(())
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             version       INTEGER PRIMARY KEY,
             applied_at_ms INTEGER NOT NULL
         );",
    )?;

    let current = schema_version(conn)?;
    if current > CURRENT_SCHEMA_VERSION {
        bail!(
            "database schema version {current} is newer than supported version \
             {CURRENT_SCHEMA_VERSION}"
        );
    }
    if current == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    if current < 1 {
        tx.execute_batch(INITIAL_SCHEMA).context("applying initial schema")?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at_ms) VALUES (?1, ?2)",
            params![1, crate::now_ms()],
        )?;
        debug!(version = 1, "applied schema migration");
    }
    tx.commit()?;
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}
