use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A log entry to rewrite or erase does not exist.
    #[error("Record not found")]
    NotFound,

    #[error("Migration error: {0}")]
    Migration(String),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Background(String),

    /// Set on an in-memory store to make every write fail.
    #[error("Store is read-only")]
    ReadOnly,
}

pub type Result<T> = std::result::Result<T, StoreError>;
