//! SQLite-backed vector index with exact cosine search
//!
//! Vectors are stored as little-endian `f32` blobs next to their chunk text
//! and metadata. Document filters are applied in SQL, so `k` results are
//! drawn from the filtered population.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, TransactionBehavior,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::VectorDbConfig;
use crate::error::{Error, Result};
use crate::providers::vector_store::VectorStoreProvider;
use crate::retry::Sleeper;
use crate::types::{document::chunk_id, ChunkMetadata, EvidenceItem, IndexStats};

/// File-backed vector index
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl SqliteVectorStore {
    /// Open (or create) the index file.
    ///
    /// While another process holds the database lock, opening is retried
    /// `lock_retry_attempts` times with a fixed delay before failing with
    /// [`Error::ResourceBusy`]. A damaged file fails immediately with
    /// [`Error::IndexCorruption`]. Once open, statements wait up to
    /// `busy_timeout_ms` for other connections.
    pub async fn open(
        config: &VectorDbConfig,
        dimensions: usize,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let path = config.storage_path.clone();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = config.busy_timeout();
        let mut attempt = 0u32;
        loop {
            let attempt_path = path.clone();
            let opened = tokio::task::spawn_blocking(move || {
                open_file(&attempt_path, dimensions, busy_timeout)
            })
                .await
                .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?;

            match opened {
                Ok(conn) => {
                    info!(
                        "Opened vector index at {} ({} dimensions)",
                        path.display(),
                        dimensions
                    );
                    return Ok(Self::from_connection(conn, dimensions));
                }
                Err(Error::ResourceBusy(reason)) if attempt < config.lock_retry_attempts => {
                    attempt += 1;
                    warn!(
                        "Vector index is locked ({}), retry {}/{} in {:?}",
                        reason,
                        attempt,
                        config.lock_retry_attempts,
                        config.lock_retry_delay()
                    );
                    sleeper.sleep(config.lock_retry_delay()).await;
                }
                Err(Error::ResourceBusy(reason)) => {
                    return Err(Error::ResourceBusy(format!(
                        "{} is locked by another process after {} attempts: {}",
                        path.display(),
                        attempt + 1,
                        reason
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create an in-memory index (for tests and ephemeral runs)
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(classify_sqlite)?;
        migrate(&conn, dimensions)?;
        Ok(Self::from_connection(conn, dimensions))
    }

    fn from_connection(conn: Connection, dimensions: usize) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
        }
    }

    fn upsert_blocking(
        conn: &Mutex<Connection>,
        dimensions: usize,
        document_id: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
    ) -> Result<usize> {
        let mut conn = conn.lock();
        // Take the write lock up front so contention goes through the busy timeout
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chunks (id, document_id, ordinal, filename, page, chunk_index, text, embedding, norm)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    ordinal = excluded.ordinal,
                    filename = excluded.filename,
                    page = excluded.page,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding,
                    norm = excluded.norm
                "#,
            )?;

            for (ordinal, ((text, vector), meta)) in
                texts.iter().zip(vectors).zip(metadatas).enumerate()
            {
                if vector.len() != dimensions {
                    return Err(Error::config(format!(
                        "vector for chunk {} has {} dimensions, index expects {}",
                        ordinal,
                        vector.len(),
                        dimensions
                    )));
                }

                stmt.execute(params![
                    chunk_id(document_id, ordinal),
                    document_id,
                    ordinal as i64,
                    meta.filename,
                    meta.page,
                    meta.chunk_index,
                    text,
                    encode_vector(vector),
                    norm(vector) as f64,
                ])?;
            }
        }

        // A shorter re-upload must not leave the tail of the previous version
        let stale = tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1 AND ordinal >= ?2",
            params![document_id, texts.len() as i64],
        )?;
        tx.commit()?;

        if stale > 0 {
            debug!("Removed {} stale chunks of {}", stale, document_id);
        }
        Ok(texts.len())
    }

    fn query_blocking(
        conn: &Mutex<Connection>,
        vector: &[f32],
        k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<EvidenceItem>> {
        let query_norm = norm(vector);
        if k == 0 || query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT id, document_id, filename, page, chunk_index, text, embedding, norm \
             FROM chunks WHERE norm > 0",
        );
        let filter: Vec<&str> = match allowed_document_ids {
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                sql.push_str(&format!(" AND document_id IN ({})", placeholders));
                ids.iter().map(String::as_str).collect()
            }
            None => Vec::new(),
        };

        let conn = conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter), |row| {
            let embedding: Vec<u8> = row.get(6)?;
            let stored_norm: f64 = row.get(7)?;
            Ok((
                EvidenceItem {
                    id: row.get(0)?,
                    text: row.get(5)?,
                    metadata: ChunkMetadata {
                        document_id: row.get(1)?,
                        filename: row.get(2)?,
                        page: row.get(3)?,
                        chunk_index: row.get(4)?,
                    },
                    similarity: 0.0,
                },
                embedding,
                stored_norm as f32,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (mut item, embedding, stored_norm) = row?;
            let stored = decode_vector(&embedding);
            if stored.len() != vector.len() {
                continue;
            }
            let dot: f32 = stored.iter().zip(vector).map(|(a, b)| a * b).sum();
            item.similarity = dot / (stored_norm * query_norm);
            results.push(item);
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }
}

/// Open a file-backed connection and bring the schema up to date
fn open_file(path: &Path, dimensions: usize, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).map_err(classify_sqlite)?;
    // Lock contention while opening is handled by the caller's retry loop
    conn.busy_timeout(Duration::ZERO).map_err(classify_sqlite)?;
    migrate(&conn, dimensions)?;
    conn.busy_timeout(busy_timeout).map_err(classify_sqlite)?;
    Ok(conn)
}

fn migrate(conn: &Connection, dimensions: usize) -> Result<()> {
    // Reading the schema surfaces lock and format problems first
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(classify_sqlite)?;

    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
        .map_err(classify_sqlite)?;

    conn.execute_batch(
        r#"
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            filename TEXT NOT NULL,
            page INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            norm REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .map_err(classify_sqlite)?;

    conn.execute(
        "INSERT OR IGNORE INTO index_meta (key, value) VALUES ('dimensions', ?1)",
        params![dimensions.to_string()],
    )
    .map_err(classify_sqlite)?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(classify_sqlite)?;

    match stored.and_then(|v| v.parse::<usize>().ok()) {
        Some(existing) if existing == dimensions => Ok(()),
        Some(existing) => Err(Error::config(format!(
            "vector index was created with {} dimensions, configured {}",
            existing, dimensions
        ))),
        None => Err(Error::IndexCorruption(
            "index metadata has no valid dimensions entry".to_string(),
        )),
    }
}

/// Separate lock contention and damaged files from other SQLite failures
fn classify_sqlite(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                Error::ResourceBusy(err.to_string())
            }
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                Error::IndexCorruption(err.to_string())
            }
            _ => Error::VectorDb(err.to_string()),
        },
        _ => Error::VectorDb(err.to_string()),
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[async_trait]
impl VectorStoreProvider for SqliteVectorStore {
    async fn upsert(
        &self,
        document_id: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
    ) -> Result<usize> {
        if document_id.is_empty() {
            return Err(Error::InvalidInput("document id must not be empty".to_string()));
        }
        if texts.len() != vectors.len() || texts.len() != metadatas.len() {
            return Err(Error::InvalidInput(format!(
                "upsert needs equal lengths, got {} texts, {} vectors, {} metadatas",
                texts.len(),
                vectors.len(),
                metadatas.len()
            )));
        }

        let conn = self.conn.clone();
        let dimensions = self.dimensions;
        let document_id = document_id.to_string();
        let texts = texts.to_vec();
        let vectors = vectors.to_vec();
        let metadatas = metadatas.to_vec();

        tokio::task::spawn_blocking(move || {
            Self::upsert_blocking(&conn, dimensions, &document_id, &texts, &vectors, &metadatas)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<EvidenceItem>> {
        if vector.len() != self.dimensions {
            return Err(Error::config(format!(
                "query vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        let conn = self.conn.clone();
        let vector = vector.to_vec();
        let filter = allowed_document_ids.map(|ids| ids.to_vec());

        tokio::task::spawn_blocking(move || {
            Self::query_blocking(&conn, &vector, k, filter.as_deref())
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let conn = self.conn.clone();
        let document_id = document_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let conn = conn.lock();
            let removed = conn.execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )?;
            Ok(removed)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn stats(&self) -> Result<IndexStats> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<IndexStats> {
            let conn = conn.lock();
            let count: i64 = conn.query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
            Ok(IndexStats {
                count: count as usize,
            })
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.stats().await.is_ok())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
