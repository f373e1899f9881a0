//! [`KeyValueStore`] and [`WriteAheadLog`] backed by one SQLite file.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::binlog::{LogEntry, LogEventId};
use crate::boundary::{KeyValueStore, WriteAheadLog};
use crate::database::Database;
use crate::error::{Result, StoreError};

/// Shared handle to a [`Database`].
///
/// Keyed-store calls run on the blocking thread pool; log calls run inline
/// because callers rely on them being durable when they return.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    /// Run `f` with exclusive access to the database.
    pub fn with_database<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        f(&*lock(&self.db))
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&*lock(&db)))
            .await
            .map_err(|e| StoreError::Background(e.to_string()))?
    }
}

fn lock(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let key = key.to_string();
        let value = self.run_blocking(move |db| db.get_value(&key)).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let key = key.to_string();
        self.run_blocking(move |db| db.set_value(&key, &value)).await
    }

    async fn erase(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run_blocking(move |db| db.erase_value(&key).map(|_| ()))
            .await
    }
}

impl WriteAheadLog for SqliteStore {
    fn append(&self, kind: u32, data: &[u8]) -> Result<LogEventId> {
        lock(&self.db).append_log_event(kind, data)
    }

    fn rewrite(&self, id: LogEventId, data: &[u8]) -> Result<()> {
        lock(&self.db).rewrite_log_event(id, data)
    }

    fn erase(&self, id: LogEventId) -> Result<()> {
        lock(&self.db).erase_log_event(id).map(|_| ())
    }

    fn pending(&self) -> Result<Vec<LogEntry>> {
        lock(&self.db).pending_log_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_at(&dir.path().join("store.db")).unwrap();

        store.set("ch7", Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(
            store.get("ch7").await.unwrap(),
            Some(Bytes::from_static(b"payload"))
        );
        KeyValueStore::erase(&store, "ch7").await.unwrap();
        assert_eq!(store.get("ch7").await.unwrap(), None);

        let id = store.append(3, b"pending").unwrap();
        assert_eq!(store.pending().unwrap().len(), 1);
        WriteAheadLog::erase(&store, id).unwrap();
        assert!(store.pending().unwrap().is_empty());
    }
}
