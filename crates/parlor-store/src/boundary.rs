//! Storage boundaries consumed by the engine.

use async_trait::async_trait;
use bytes::Bytes;

use crate::binlog::{LogEntry, LogEventId};
use crate::error::Result;

/// Ordered, durable get/set/erase service keyed by strings.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    async fn erase(&self, key: &str) -> Result<()>;
}

/// Append-only log of pending record writes.
///
/// Calls are synchronous: an entry must be durable before the caller goes on
/// to treat the in-memory change as persisted.
pub trait WriteAheadLog: Send + Sync {
    fn append(&self, kind: u32, data: &[u8]) -> Result<LogEventId>;

    fn rewrite(&self, id: LogEventId, data: &[u8]) -> Result<()>;

    fn erase(&self, id: LogEventId) -> Result<()>;

    /// Entries not yet erased, oldest first.
    fn pending(&self) -> Result<Vec<LogEntry>>;
}
