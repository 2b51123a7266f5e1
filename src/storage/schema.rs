//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite batch store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per durable batch
CREATE TABLE IF NOT EXISTS batches (
    name TEXT PRIMARY KEY,
    facet TEXT NOT NULL,
    range_lower INTEGER NOT NULL,
    range_upper INTEGER NOT NULL,
    first_item INTEGER NOT NULL,
    last_item INTEGER NOT NULL,
    record_count INTEGER NOT NULL,
    written_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_batches_partition ON batches(facet, range_lower);

-- Extracted records, in buffer order within a batch
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_name TEXT NOT NULL REFERENCES batches(name) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    item_id TEXT NOT NULL,
    price TEXT NOT NULL,
    price_value REAL NOT NULL,
    description TEXT NOT NULL,
    attributes TEXT NOT NULL,
    specs TEXT NOT NULL,
    session_id TEXT NOT NULL,
    UNIQUE(batch_name, position)
);

CREATE INDEX IF NOT EXISTS idx_records_item ON records(item_id);

-- Raw image payloads per record
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    payload BLOB NOT NULL,
    UNIQUE(record_id, position)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
