//! The node's SQLite file.
//!
//! A [`Database`] is only handed out once the schema is current, so the cache
//! and inbox helpers never see a partially migrated file.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const FILE_NAME: &str = "lifeline.db";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database in the platform data directory, e.g.
    /// `~/.local/share/lifeline/lifeline.db` on Linux.
    pub fn new() -> Result<Self> {
        let path = Self::default_path()?;
        tracing::info!(path = %path.display(), "using default node database");
        Self::open_at(&path)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "lifeline", "lifeline").ok_or(StoreError::NoDataDir)?;
        let dir = dirs.data_dir();
        std::fs::create_dir_all(dir)?;
        Ok(dir.join(FILE_NAME))
    }

    /// Open `path`, creating the file and any missing parent directories.
    pub fn open_at(path: &Path) -> Result<Self> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)?,
            _ => {}
        }

        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory connections.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(db: &Database) -> u32 {
        db.conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("node.db");

        let db = Database::open_at(&path).unwrap();
        assert!(db.path().is_some());
        assert!(path.exists());
        assert_eq!(user_version(&db), migrations::CURRENT_VERSION);
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.db");
        drop(Database::open_at(&path).unwrap());

        let db = Database::open_at(&path).unwrap();
        assert_eq!(user_version(&db), 2);
        let tables: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('cache_entries', 'inbound_sos')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
