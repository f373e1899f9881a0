//! # parlor-store
//!
//! Durable storage behind the entity cache: a keyed persistent store and a
//! write-ahead log.
//!
//! The engine only talks to the [`KeyValueStore`] and [`WriteAheadLog`]
//! traits. [`SqliteStore`] implements both on top of a single SQLite file
//! ([`Database`]); [`MemoryStore`] and [`MemoryLog`] keep everything in
//! process memory for tests and for sessions running without a database.

pub mod binlog;
pub mod boundary;
pub mod database;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod sqlite;

mod error;

pub use binlog::{LogEntry, LogEventId};
pub use boundary::{KeyValueStore, WriteAheadLog};
pub use database::Database;
pub use error::{Result, StoreError};
pub use memory::{MemoryLog, MemoryStore};
pub use sqlite::SqliteStore;
