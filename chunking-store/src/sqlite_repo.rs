use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chunk_model::{meta_from_json, meta_to_json, truncate_chars, ChunkRecord, RetrievalResult, MAX_CHUNK_CHARS};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::{DocumentRow, StoreError, StoreStats};

/// SQLite-backed chunk store: texts, metadata and embeddings in one table.
pub struct SqliteRepo {
    conn: Connection,
}

impl SqliteRepo {
    /// Open a file-backed repository at `path` and initialize schema if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.init()?;
        Ok(repo)
    }

    fn init(&self) -> rusqlite::Result<()> {
        self.conn.busy_timeout(Duration::from_secs(5))?;
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                rowid INTEGER PRIMARY KEY,
                doc_id TEXT NOT NULL,
                source_uri TEXT NOT NULL,
                seq INTEGER NOT NULL,
                page INTEGER,
                text TEXT NOT NULL,
                meta_json TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dim INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_doc_seq ON chunks(doc_id, seq);

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY,
                doc_id TEXT NOT NULL,
                source_uri TEXT NOT NULL,
                content_sha256 TEXT,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_doc_id ON documents(doc_id);
            "#,
        )
    }

    /// Embedding dimension of the stored rows, if any row exists.
    pub fn stored_dimension(&self) -> Result<Option<usize>, StoreError> {
        let dim: Option<i64> = self
            .conn
            .query_row("SELECT dim FROM chunks ORDER BY rowid LIMIT 1", [], |r| r.get(0))
            .optional()?;
        Ok(dim.map(|d| d as usize))
    }

    /// Insert a document's chunks, embeddings and registry row in one transaction.
    /// Returns the number of chunks written.
    pub fn insert_document(
        &mut self,
        doc: &DocumentRow,
        chunks: &[ChunkRecord],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        if chunks.len() != vectors.len() {
            return Err(StoreError::BatchMismatch { chunks: chunks.len(), vectors: vectors.len() });
        }
        let Some(first) = vectors.first() else { return Ok(0) };
        let dim = first.len();
        if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
            return Err(StoreError::DimensionMismatch { expected: dim, actual: v.len() });
        }

        let ingested_at = if doc.ingested_at.is_empty() {
            chrono::Utc::now().to_rfc3339()
        } else {
            doc.ingested_at.clone()
        };

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<i64> = tx
            .query_row("SELECT dim FROM chunks ORDER BY rowid LIMIT 1", [], |r| r.get(0))
            .optional()?;
        if let Some(expected) = existing {
            if expected as usize != dim {
                return Err(StoreError::DimensionMismatch { expected: expected as usize, actual: dim });
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (doc_id, source_uri, seq, page, text, meta_json, embedding, dim, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (chunk, vector) in chunks.iter().zip(vectors) {
                let text = truncate_chars(&chunk.text, MAX_CHUNK_CHARS);
                let bytes: &[u8] = bytemuck::cast_slice(&vector[..]);
                stmt.execute(params![
                    chunk.doc_id.0,
                    chunk.source_uri,
                    chunk.sequence_index as i64,
                    chunk.page.map(|p| p as i64),
                    text,
                    meta_to_json(&chunk.metadata()),
                    bytes,
                    dim as i64,
                    ingested_at,
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO documents (doc_id, source_uri, content_sha256, chunk_count, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![doc.doc_id, doc.source_uri, doc.content_sha256, chunks.len() as i64, ingested_at],
        )?;
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Highest chunk rowid, or 0 for an empty table.
    pub fn max_rowid(&self) -> Result<i64, StoreError> {
        let max: Option<i64> = self.conn.query_row("SELECT max(rowid) FROM chunks", [], |r| r.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// Embeddings with rowid greater than `after`, in rowid order.
    pub fn vectors_after(&self, after: i64) -> Result<Vec<(i64, Vec<f32>)>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT rowid, embedding FROM chunks WHERE rowid > ?1 ORDER BY rowid")?;
        let rows = stmt.query_map([after], |row| {
            let rowid: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((rowid, blob))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (rowid, blob) = r?;
            if blob.len() % 4 != 0 {
                return Err(StoreError::Corrupt(format!("embedding of row {rowid} is {} bytes", blob.len())));
            }
            out.push((rowid, bytemuck::pod_collect_to_vec::<u8, f32>(&blob)));
        }
        Ok(out)
    }

    /// Fetch retrieval results for the given rowids. Missing ids are skipped.
    pub fn results_by_rowids(&self, rowids: &[i64]) -> Result<HashMap<i64, RetrievalResult>, StoreError> {
        let mut out = HashMap::with_capacity(rowids.len());
        if rowids.is_empty() {
            return Ok(out);
        }
        let placeholders = vec!["?"; rowids.len()].join(",");
        let sql = format!("SELECT rowid, text, meta_json FROM chunks WHERE rowid IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(rowids.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for r in rows {
            let (rowid, text, meta_json) = r?;
            out.insert(rowid, to_result(rowid, text, &meta_json)?);
        }
        Ok(out)
    }

    /// Every stored chunk in insertion order.
    pub fn snapshot(&self) -> Result<Vec<RetrievalResult>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT rowid, text, meta_json FROM chunks ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (rowid, text, meta_json) = r?;
            out.push(to_result(rowid, text, &meta_json)?);
        }
        Ok(out)
    }

    /// Registry rows, oldest first.
    pub fn list_documents(&self) -> Result<Vec<DocumentRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, source_uri, content_sha256, chunk_count, ingested_at FROM documents ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DocumentRow {
                doc_id: row.get(0)?,
                source_uri: row.get(1)?,
                content_sha256: row.get(2)?,
                chunk_count: row.get::<_, i64>(3)? as usize,
                ingested_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows { out.push(r?); }
        Ok(out)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let documents: i64 = self.conn.query_row("SELECT count(*) FROM documents", [], |r| r.get(0))?;
        let chunks: i64 = self.conn.query_row("SELECT count(*) FROM chunks", [], |r| r.get(0))?;
        Ok(StoreStats { documents: documents as usize, chunks: chunks as usize, dimension: self.stored_dimension()? })
    }
}

fn to_result(rowid: i64, text: String, meta_json: &str) -> Result<RetrievalResult, StoreError> {
    let meta = meta_from_json(meta_json)
        .ok_or_else(|| StoreError::Corrupt(format!("metadata of row {rowid} is not a JSON string map")))?;
    Ok(RetrievalResult::new(text, meta))
}
