//! Write-ahead log operations on the `binlog` table.
//!
//! An entry is appended before a record write is handed to the keyed store
//! and erased once that write is confirmed, so whatever is left here on
//! startup is exactly the set of writes that may have been lost.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Identifier of a write-ahead-log entry.
pub type LogEventId = u64;

/// A pending log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogEventId,
    pub kind: u32,
    pub data: Vec<u8>,
}

impl Database {
    pub fn append_log_event(&self, kind: u32, data: &[u8]) -> Result<LogEventId> {
        self.conn().execute(
            "INSERT INTO binlog (kind, data, created_at) VALUES (?1, ?2, ?3)",
            params![kind, data, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn().last_insert_rowid() as LogEventId)
    }

    pub fn rewrite_log_event(&self, id: LogEventId, data: &[u8]) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE binlog SET data = ?1 WHERE id = ?2",
            params![data, id as i64],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Returns `true` if an entry was deleted.
    pub fn erase_log_event(&self, id: LogEventId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM binlog WHERE id = ?1", params![id as i64])?;
        Ok(affected > 0)
    }

    /// Every entry still in the log, oldest first.
    pub fn pending_log_events(&self) -> Result<Vec<LogEntry>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, kind, data FROM binlog ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            Ok(LogEntry {
                id: id as LogEventId,
                kind: row.get(1)?,
                data: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::error::StoreError;

    #[test]
    fn test_append_rewrite_erase() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("log.db")).unwrap();

        let first = db.append_log_event(1, b"one").unwrap();
        let second = db.append_log_event(3, b"two").unwrap();
        assert!(second > first);

        db.rewrite_log_event(first, b"uno").unwrap();
        let pending = db.pending_log_events().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].data, b"uno".to_vec());
        assert_eq!(pending[1].kind, 3);

        assert!(db.erase_log_event(first).unwrap());
        assert_eq!(db.pending_log_events().unwrap().len(), 1);
        assert!(matches!(
            db.rewrite_log_event(first, b"gone"),
            Err(StoreError::NotFound)
        ));
    }
}
