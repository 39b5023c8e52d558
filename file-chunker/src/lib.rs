pub mod reader_pdf;
pub mod reader_docx;
pub mod unified_blocks;
pub mod splitter;
pub mod parent_window;

use chunk_model::{ChunkParams, ChunkRecord, DocumentId, MAX_CHUNK_CHARS, META_DOC_SHA256};
use sha2::Digest;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use unified_blocks::UnifiedBlock;

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("unsupported document format `{extension}`: only .pdf and .docx are accepted")]
    UnsupportedFormat { extension: String },
    #[error("document `{path}` has no extractable text")]
    EmptyDocument { path: String },
    #[error("document `{path}` produced no non-empty chunks (chunk_size={chunk_size}, chunk_overlap={chunk_overlap})")]
    EmptyAfterSplit { path: String, chunk_size: usize, chunk_overlap: usize },
    #[error("failed to read `{path}`: {message}")]
    Extraction { path: String, message: String },
}

/// Accepted input formats; only the file extension decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_path(path: &str) -> Result<Self, ChunkError> {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            _ => Err(ChunkError::UnsupportedFormat { extension: ext }),
        }
    }
}

/// A document that has been read and split, before parent windows are attached.
#[derive(Debug, Clone)]
pub struct SplitDocument {
    pub doc_id: DocumentId,
    pub kind: DocumentKind,
    pub content_sha256: Option<String>,
    pub chunks: Vec<ChunkRecord>,
}

/// Result bundle of a fully chunked and windowed document.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub doc_id: DocumentId,
    pub kind: DocumentKind,
    pub content_sha256: Option<String>,
    pub chunks: Vec<ChunkRecord>,
    /// Number of chunk texts cut down to [`MAX_CHUNK_CHARS`].
    pub capped: usize,
}

impl SplitDocument {
    /// Attach parent windows, cap chunk texts and stamp the content hash.
    ///
    /// Windows are computed from the uncapped texts.
    pub fn into_windowed(self, window_size: usize) -> ChunkOutput {
        let SplitDocument { doc_id, kind, content_sha256, mut chunks } = self;
        parent_window::attach_parent_windows(&mut chunks, window_size);
        let mut capped = 0usize;
        for chunk in chunks.iter_mut() {
            if chunk.cap_text(MAX_CHUNK_CHARS) {
                capped += 1;
            }
            if let Some(hex) = &content_sha256 {
                chunk.meta.insert(META_DOC_SHA256.to_string(), hex.clone());
            }
        }
        ChunkOutput { doc_id, kind, content_sha256, chunks, capped }
    }
}

/// Run the reader selected by `kind`.
pub fn read_blocks(path: &str, kind: DocumentKind) -> Result<Vec<UnifiedBlock>, ChunkError> {
    match kind {
        DocumentKind::Pdf => reader_pdf::read_pdf_to_blocks(path),
        DocumentKind::Docx => reader_docx::read_docx_to_blocks(path),
    }
}

/// Split raw blocks into contiguously numbered chunks (no parent windows yet).
///
/// Blocks are trimmed and blank ones dropped first; each remaining block is
/// split on its own so chunks keep the block's page.
pub fn split_blocks(
    doc_id: &DocumentId,
    source_uri: &str,
    blocks: &[UnifiedBlock],
    params: &ChunkParams,
) -> Result<Vec<ChunkRecord>, ChunkError> {
    let cleaned: Vec<&UnifiedBlock> = blocks.iter().filter(|b| !b.is_blank()).collect();
    if cleaned.is_empty() {
        return Err(ChunkError::EmptyDocument { path: source_uri.to_string() });
    }

    let splitter = splitter::RecursiveSplitter::new(params.chunk_size, params.chunk_overlap);
    let mut chunks: Vec<ChunkRecord> = Vec::new();
    for block in cleaned {
        for text in splitter.split(block.text.trim()) {
            let trimmed = text.trim();
            if trimmed.is_empty() { continue; }
            // Renumbered after dropping blanks so window math stays contiguous.
            let mut rec = ChunkRecord::new(doc_id.clone(), source_uri, chunks.len() as u32, trimmed);
            rec.page = block.page;
            chunks.push(rec);
        }
    }

    if chunks.is_empty() {
        return Err(ChunkError::EmptyAfterSplit {
            path: source_uri.to_string(),
            chunk_size: params.chunk_size,
            chunk_overlap: params.chunk_overlap,
        });
    }
    Ok(chunks)
}

/// Read and split a document of a known kind; the path is its document id.
pub fn split_document(path: &str, kind: DocumentKind, params: &ChunkParams) -> Result<SplitDocument, ChunkError> {
    let blocks = read_blocks(path, kind)?;
    let doc_id = DocumentId(path.to_string());
    let chunks = split_blocks(&doc_id, path, &blocks, params)?;
    debug!(path, blocks = blocks.len(), chunks = chunks.len(), "document split");
    let content_sha256 = compute_sha256_hex(path);
    Ok(SplitDocument { doc_id, kind, content_sha256, chunks })
}

/// High-level entry: check the format, read, split, window and cap a document on disk.
pub fn chunk_document(path: &str, params: &ChunkParams) -> Result<ChunkOutput, ChunkError> {
    let kind = DocumentKind::from_path(path)?;
    Ok(split_document(path, kind, params)?.into_windowed(params.window_size))
}

/// SHA-256 of the file content, hex encoded.
pub fn compute_sha256_hex(path: &str) -> Option<String> {
    let f = File::open(path).ok()?;
    let mut reader = BufReader::new(f);
    let mut hasher = sha2::Sha256::new();
    let mut buf = [0u8; 32 * 1024];
    loop {
        let n = reader.read(&mut buf).ok()?;
        if n == 0 { break; }
        hasher.update(&buf[..n]);
    }
    Some(hex::encode(hasher.finalize()))
}
