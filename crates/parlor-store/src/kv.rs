//! Keyed record operations on the `kv` table.

use chrono::Utc;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    pub fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let found = self.conn().query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        );
        match found {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }

    /// Insert or overwrite the value stored under `key`.
    pub fn set_value(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns `true` if a row was deleted.
    pub fn erase_value(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// All keys that start with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT key FROM kv
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_values(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("kv.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_set_get_overwrite_erase() {
        let (_dir, db) = open();

        assert_eq!(db.get_value("us1").unwrap(), None);

        db.set_value("us1", b"first").unwrap();
        db.set_value("us1", b"second").unwrap();
        assert_eq!(db.get_value("us1").unwrap(), Some(b"second".to_vec()));
        assert_eq!(db.count_values().unwrap(), 1);

        assert!(db.erase_value("us1").unwrap());
        assert!(!db.erase_value("us1").unwrap());
        assert_eq!(db.get_value("us1").unwrap(), None);
    }

    #[test]
    fn test_prefix_scan() {
        let (_dir, db) = open();
        db.set_value("us1", b"a").unwrap();
        db.set_value("us2", b"b").unwrap();
        db.set_value("ch1", b"c").unwrap();

        let keys = db.keys_with_prefix("us").unwrap();
        assert_eq!(keys, vec!["us1".to_string(), "us2".to_string()]);
    }
}
