//! SQLite batch store
//!
//! This module provides a SQLite-based implementation of the BatchSink trait.
//! Every batch is written in a single transaction, so a crash leaves either
//! the whole batch or none of it.

use crate::output::ItemRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{BatchReceipt, BatchSink, RecordBatch, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite batch backend
pub struct SqliteBatchSink {
    conn: Connection,
}

impl SqliteBatchSink {
    /// Opens or creates the batch database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteBatchSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Loads the records of one batch in buffer order
    pub fn load_batch(&self, name: &str) -> StorageResult<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_id, price, price_value, description, attributes, specs, session_id
             FROM records WHERE batch_name = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut image_stmt = self
            .conn
            .prepare("SELECT payload FROM images WHERE record_id = ?1 ORDER BY position")?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, item_id, price, price_value, description, attributes, specs, session_id) in rows {
            let images = image_stmt
                .query_map(params![id], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            records.push(ItemRecord {
                item_id,
                price,
                price_value,
                description,
                images,
                attributes: serde_json::from_str(&attributes)?,
                specs: serde_json::from_str(&specs)?,
                session_id,
            });
        }
        Ok(records)
    }

    pub fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl BatchSink for SqliteBatchSink {
    fn write_batch(&mut self, batch: &RecordBatch<'_>) -> StorageResult<BatchReceipt> {
        let name = batch.name();
        let tx = self.conn.transaction()?;

        // Rewriting a batch replaces it; cascades clear its records and images
        tx.execute("DELETE FROM batches WHERE name = ?1", params![name])?;
        tx.execute(
            "INSERT INTO batches (name, facet, range_lower, range_upper, first_item, last_item, record_count, written_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                batch.partition.facet,
                batch.partition.range.lower,
                batch.partition.range.upper,
                batch.first_item as i64,
                batch.last_item as i64,
                batch.records.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;

        for (position, record) in batch.records.iter().enumerate() {
            tx.execute(
                "INSERT INTO records (batch_name, position, item_id, price, price_value, description, attributes, specs, session_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    name,
                    position as i64,
                    record.item_id,
                    record.price,
                    record.price_value,
                    record.description,
                    serde_json::to_string(&record.attributes)?,
                    serde_json::to_string(&record.specs)?,
                    record.session_id,
                ],
            )?;
            let record_id = tx.last_insert_rowid();

            for (image_position, payload) in record.images.iter().enumerate() {
                tx.execute(
                    "INSERT INTO images (record_id, position, payload) VALUES (?1, ?2, ?3)",
                    params![record_id, image_position as i64, payload],
                )?;
            }
        }

        tx.commit()?;

        Ok(BatchReceipt {
            name,
            records: batch.records.len(),
            first_item: batch.first_item,
            last_item: batch.last_item,
        })
    }

    fn batch_names(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM batches ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}
