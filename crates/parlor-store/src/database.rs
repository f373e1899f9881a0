//! The SQLite file behind the cache.
//!
//! A [`Database`] is only handed out after its schema has been migrated to
//! the current version.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Where a session keeps its cache unless told otherwise:
    /// - Linux:   `~/.local/share/parlor/cache.db`
    /// - macOS:   `~/Library/Application Support/dev.parlor.parlor/cache.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parlor\parlor\data\cache.db`
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "parlor", "parlor").ok_or(StoreError::NoDataDir)?;
        Ok(dirs.data_dir().join("cache.db"))
    }

    /// Open or create the cache at `path`, creating missing parent
    /// directories.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), "Opening cache database");

        let conn = Connection::open(path)?;
        // Record writes are re-issued from the log after a crash, so NORMAL
        // is enough.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<u32> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }
}
