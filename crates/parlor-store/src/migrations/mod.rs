//! Schema migrations, applied in order by [`Database::open_at`].
//!
//! The schema version lives in SQLite's `user_version` pragma; every
//! migration above it runs once and bumps it.
//!
//! [`Database::open_at`]: crate::Database::open_at

pub mod v001_initial;
pub mod v002_binlog;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Up = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

const MIGRATIONS: [(u32, &str, Up); 2] = [
    (1, "v001_initial", v001_initial::up),
    (2, "v002_binlog", v002_binlog::up),
];

pub(crate) const CURRENT_VERSION: u32 = MIGRATIONS[MIGRATIONS.len() - 1].0;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {current} is newer than this build ({CURRENT_VERSION})"
        )));
    }

    for (version, name, up) in MIGRATIONS {
        if version <= current {
            continue;
        }
        tracing::info!(version, name, "Applying migration");
        up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}
