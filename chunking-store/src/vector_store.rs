use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};

use chunk_model::{ChunkRecord, RetrievalResult};
use tracing::{debug, info};

use crate::hnsw_index::{is_zero, HnswIndex};
use crate::sqlite_repo::SqliteRepo;
use crate::{DocumentRow, SearchOptions, StoreError, StoreStats};

pub const DB_FILE_NAME: &str = "chunks.db";

/// Persistent vector index rooted at a directory.
///
/// Presence of a non-empty directory is the only create-vs-append signal. A
/// repository connection is opened per operation; the HNSW graph stays
/// resident and is caught up from the store before each query.
pub struct VectorStore {
    dir: PathBuf,
    ann: RwLock<Option<HnswIndex>>,
}

impl VectorStore {
    /// Bind to `dir` without touching the filesystem.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), ann: RwLock::new(None) }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn db_path(&self) -> PathBuf { self.dir.join(DB_FILE_NAME) }

    /// Highest store rowid held by the resident graph, if one is loaded.
    pub fn resident_upto(&self) -> Option<i64> {
        self.ann.read().unwrap_or_else(|e| e.into_inner()).as_ref().map(HnswIndex::loaded_upto)
    }

    /// True when the directory exists and holds at least one entry.
    pub fn exists(&self) -> bool {
        fs::read_dir(&self.dir).map(|mut it| it.next().is_some()).unwrap_or(false)
    }

    fn open_existing(&self) -> Result<Option<SqliteRepo>, StoreError> {
        if !self.exists() || !self.db_path().exists() {
            return Ok(None);
        }
        SqliteRepo::open(self.db_path()).map(Some)
    }

    /// Write one document's chunks and embeddings; creates the store on first use.
    /// All rows land in one transaction. Returns the number of chunks written.
    pub fn upsert(&self, doc: &DocumentRow, chunks: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<usize, StoreError> {
        if chunks.len() != vectors.len() {
            return Err(StoreError::BatchMismatch { chunks: chunks.len(), vectors: vectors.len() });
        }
        if self.exists() {
            debug!(dir = %self.dir.display(), doc = %doc.doc_id, "appending to existing store");
        } else {
            info!(dir = %self.dir.display(), doc = %doc.doc_id, "creating store");
            fs::create_dir_all(&self.dir)?;
        }
        let mut repo = SqliteRepo::open(self.db_path())?;
        let written = repo.insert_document(doc, chunks, vectors)?;
        info!(doc = %doc.doc_id, chunks = written, "chunks indexed");
        Ok(written)
    }

    /// `opts.top_k` nearest stored chunks by cosine similarity, most similar first.
    ///
    /// A cold store or a zero query vector yields an empty list.
    pub fn query(&self, vector: &[f32], opts: &SearchOptions) -> Result<Vec<RetrievalResult>, StoreError> {
        if opts.top_k == 0 || is_zero(vector) {
            return Ok(Vec::new());
        }
        let Some(repo) = self.open_existing()? else { return Ok(Vec::new()) };
        let Some(dim) = repo.stored_dimension()? else { return Ok(Vec::new()) };
        if vector.len() != dim {
            return Err(StoreError::DimensionMismatch { expected: dim, actual: vector.len() });
        }

        self.catch_up(&repo, dim)?;
        let ef_search = opts.top_k.saturating_mul(opts.fetch_factor).max(64);
        let hits = {
            let guard = self.ann.read().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(index) => index.search(vector, opts.top_k, ef_search),
                None => Vec::new(),
            }
        };

        let rowids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        let mut by_id = repo.results_by_rowids(&rowids)?;
        let results: Vec<RetrievalResult> = rowids.iter().filter_map(|id| by_id.remove(id)).collect();
        debug!(k = opts.top_k, hits = results.len(), "vector query");
        Ok(results)
    }

    /// Bring the resident graph up to date with the store. Queries that find
    /// nothing pending only take the read lock.
    fn catch_up(&self, repo: &SqliteRepo, dim: usize) -> Result<(), StoreError> {
        let latest = repo.max_rowid()?;
        {
            let guard = self.ann.read().unwrap_or_else(|e| e.into_inner());
            if guard.as_ref().is_some_and(|ix| ix.dimension() == dim && ix.loaded_upto() >= latest) {
                return Ok(());
            }
        }

        let mut guard = self.ann.write().unwrap_or_else(|e| e.into_inner());
        let stale = guard.as_ref().map(|ix| ix.dimension() != dim).unwrap_or(true);
        if stale {
            let pending = repo.vectors_after(0)?;
            rebuild(&mut guard, dim, pending.len().saturating_mul(2), &pending);
            return Ok(());
        }

        let after = guard.as_ref().map(HnswIndex::loaded_upto).unwrap_or(0);
        let pending = repo.vectors_after(after)?;
        if pending.is_empty() {
            return Ok(());
        }
        let fits = guard.as_ref().map(|ix| ix.has_room_for(pending.len())).unwrap_or(false);
        if fits {
            if let Some(index) = guard.as_mut() {
                index.insert(&pending);
                debug!(added = pending.len(), total = index.len(), "ann caught up");
            }
        } else {
            let capacity = guard.as_ref().map(HnswIndex::capacity).unwrap_or(0);
            let all = repo.vectors_after(0)?;
            rebuild(&mut guard, dim, capacity.saturating_mul(2).max(all.len().saturating_mul(2)), &all);
        }
        Ok(())
    }

    /// Every stored chunk in insertion order; empty on a cold store.
    pub fn snapshot(&self) -> Result<Vec<RetrievalResult>, StoreError> {
        match self.open_existing()? {
            Some(repo) => repo.snapshot(),
            None => Ok(Vec::new()),
        }
    }

    pub fn list_documents(&self) -> Result<Vec<DocumentRow>, StoreError> {
        match self.open_existing()? {
            Some(repo) => repo.list_documents(),
            None => Ok(Vec::new()),
        }
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        match self.open_existing()? {
            Some(repo) => repo.stats(),
            None => Ok(StoreStats::default()),
        }
    }
}

fn rebuild(guard: &mut RwLockWriteGuard<'_, Option<HnswIndex>>, dim: usize, capacity: usize, rows: &[(i64, Vec<f32>)]) {
    let mut index = HnswIndex::new(dim, capacity);
    index.insert(rows);
    info!(dim, capacity = index.capacity(), vectors = index.len(), "ann rebuilt from store");
    **guard = Some(index);
}
