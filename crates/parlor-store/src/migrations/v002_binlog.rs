use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Pending writes not yet confirmed by the kv table
CREATE TABLE IF NOT EXISTS binlog (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind       INTEGER NOT NULL,             -- record family
    data       BLOB NOT NULL,                -- tagged bincode record
    created_at TEXT NOT NULL                 -- ISO-8601
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
