//! In-process implementations of the storage boundaries.
//!
//! Both types count the operations they serve so callers can assert how
//! often the engine actually touched storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::binlog::{LogEntry, LogEventId};
use crate::boundary::{KeyValueStore, WriteAheadLog};
use crate::error::{Result, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Keyed store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Bytes>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    erases: AtomicUsize,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes without counting a write.
    pub fn insert_raw(&self, key: &str, value: impl Into<Bytes>) {
        lock(&self.values).insert(key.to_string(), value.into());
    }

    pub fn raw(&self, key: &str) -> Option<Bytes> {
        lock(&self.values).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.values).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn erase_count(&self) -> usize {
        self.erases.load(Ordering::SeqCst)
    }

    /// Make every subsequent `set` fail with [`StoreError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn erase(&self, key: &str) -> Result<()> {
        self.erases.fetch_add(1, Ordering::SeqCst);
        lock(&self.values).remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Write-ahead log
// ---------------------------------------------------------------------------

pub struct MemoryLog {
    entries: Mutex<BTreeMap<LogEventId, LogEntry>>,
    next_id: AtomicU64,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WriteAheadLog for MemoryLog {
    fn append(&self, kind: u32, data: &[u8]) -> Result<LogEventId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).insert(
            id,
            LogEntry {
                id,
                kind,
                data: data.to_vec(),
            },
        );
        Ok(id)
    }

    fn rewrite(&self, id: LogEventId, data: &[u8]) -> Result<()> {
        match lock(&self.entries).get_mut(&id) {
            Some(entry) => {
                entry.data = data.to_vec();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn erase(&self, id: LogEventId) -> Result<()> {
        lock(&self.entries).remove(&id);
        Ok(())
    }

    fn pending(&self) -> Result<Vec<LogEntry>> {
        Ok(lock(&self.entries).values().cloned().collect())
    }
}
