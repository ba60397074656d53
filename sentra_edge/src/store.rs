//! Sentra Edge - Embedding Store
//!
//! One signature vector per committed asset, kept in SQLite together with
//! the sync state so a batch commit is a single transaction. Readers always
//! see either the pre-batch or the post-batch store, never a mixture.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::embedder::FaceEmbedder;
use crate::error::{EdgeError, EdgeResult};
use crate::state::SyncState;

/// One face signature derived from a committed asset.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub asset_id: String,
    pub vector: Vec<f32>,
    pub label: Option<String>,
    /// SHA-256 of the ciphertext blob the vector was derived from
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A batch of store mutations applied atomically together with the state
/// advance.
#[derive(Debug, Default)]
pub struct CommitBatch {
    pub upserts: Vec<EmbeddingRecord>,
    pub removals: Vec<String>,
    pub state: SyncState,
}

/// Embedding store backed by SQLite.
pub struct EmbeddingStore {
    conn: Mutex<Connection>,
}

impl EmbeddingStore {
    /// Open (or create) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> EdgeResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                asset_id TEXT PRIMARY KEY,
                vector BLOB NOT NULL,
                label TEXT,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_created ON embeddings(created_at);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load the durable sync state (default if none committed yet).
    pub fn load_state(&self) -> EdgeResult<SyncState> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row("SELECT state FROM sync_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(SyncState::default()),
        }
    }

    /// Derive and persist an embedding for one decrypted asset.
    ///
    /// Returns `Ok(None)` when the extractor finds no face; that is a valid
    /// outcome, not an error, and no record is written. An existing record
    /// for the asset id is overwritten.
    pub fn ingest<E: FaceEmbedder>(
        &self,
        embedder: &E,
        asset_id: &str,
        content_hash: &str,
        plaintext: &[u8],
        label: Option<String>,
    ) -> EdgeResult<Option<EmbeddingRecord>> {
        let vector = match embedder.embed(plaintext)? {
            Some(vector) => vector,
            None => {
                log::info!("no face found in asset {asset_id}");
                return Ok(None);
            }
        };

        let record = EmbeddingRecord {
            asset_id: asset_id.to_string(),
            vector,
            label,
            content_hash: content_hash.to_string(),
            created_at: Utc::now(),
        };
        self.upsert(&record)?;
        Ok(Some(record))
    }

    /// Insert or replace a single record.
    pub fn upsert(&self, record: &EmbeddingRecord) -> EdgeResult<()> {
        let conn = self.conn.lock();
        insert_record(&conn, record)
    }

    /// Delete the record for an asset id (no-op if absent).
    pub fn remove(&self, asset_id: &str) -> EdgeResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM embeddings WHERE asset_id = ?1", params![asset_id])?;
        Ok(())
    }

    /// Stored content hash for an asset id, if any.
    pub fn content_hash(&self, asset_id: &str) -> EdgeResult<Option<String>> {
        let conn = self.conn.lock();
        let hash = conn
            .query_row(
                "SELECT content_hash FROM embeddings WHERE asset_id = ?1",
                params![asset_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Immutable snapshot of all records in deterministic scan order:
    /// oldest `created_at` first, insertion order within equal timestamps.
    pub fn all_records(&self) -> EdgeResult<Vec<EmbeddingRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT asset_id, vector, label, content_hash, created_at
             FROM embeddings ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (asset_id, vector_blob, label, content_hash, created_at) = row?;
            records.push(EmbeddingRecord {
                asset_id,
                vector: bincode::deserialize(&vector_blob)?,
                label,
                content_hash,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(records)
    }

    /// Number of stored records.
    pub fn count(&self) -> EdgeResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Apply a full batch - upserts, removals and the sync-state advance -
    /// as one transaction.
    pub fn commit_batch(&self, batch: &CommitBatch) -> EdgeResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for record in &batch.upserts {
            insert_record(&tx, record)?;
        }
        for asset_id in &batch.removals {
            tx.execute("DELETE FROM embeddings WHERE asset_id = ?1", params![asset_id])?;
        }

        let state_json = serde_json::to_string(&batch.state)?;
        tx.execute(
            "INSERT OR REPLACE INTO sync_state (id, state) VALUES (1, ?1)",
            params![state_json],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn insert_record(conn: &Connection, record: &EmbeddingRecord) -> EdgeResult<()> {
    let vector_blob = bincode::serialize(&record.vector)?;
    conn.execute(
        "INSERT OR REPLACE INTO embeddings (asset_id, vector, label, content_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.asset_id,
            vector_blob,
            record.label,
            record.content_hash,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn parse_timestamp(raw: &str) -> EdgeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EdgeError::Database(format!("bad timestamp {raw}: {e}")))
}
