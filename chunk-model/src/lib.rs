//! Shared models used across crates

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hard cap on stored chunk text, in characters.
pub const MAX_CHUNK_CHARS: usize = 3000;

/// Metadata keys carried by every stored chunk.
pub const META_PARENT_CONTENT: &str = "parent_content";
pub const META_SOURCE: &str = "source";
pub const META_DOC_ID: &str = "doc_id";
pub const META_PAGE: &str = "page";
pub const META_SEQUENCE_INDEX: &str = "sequence_index";
pub const META_DOC_SHA256: &str = "doc_sha256";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// Splitting and windowing parameters for one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,
    /// Number of consecutive chunks that make up a parent window.
    pub window_size: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50, window_size: 3 }
    }
}

/// A single chunk of text derived from a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: DocumentId,
    /// File path of the source document.
    pub source_uri: String,
    /// 0-based position within the document's chunk sequence (contiguous).
    pub sequence_index: u32,
    /// 1-based page the chunk was cut from, when the reader knows it.
    pub page: Option<u32>,
    /// Trimmed, non-empty chunk text.
    pub text: String,
    /// Free-form metadata; `parent_content` is attached by the window aggregator.
    pub meta: BTreeMap<String, String>,
}

impl ChunkRecord {
    pub fn new(doc_id: DocumentId, source_uri: impl Into<String>, sequence_index: u32, text: impl Into<String>) -> Self {
        Self {
            doc_id,
            source_uri: source_uri.into(),
            sequence_index,
            page: None,
            text: text.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn parent_content(&self) -> Option<&str> {
        self.meta.get(META_PARENT_CONTENT).map(String::as_str)
    }

    pub fn set_parent_content(&mut self, parent: impl Into<String>) {
        self.meta.insert(META_PARENT_CONTENT.to_string(), parent.into());
    }

    /// Truncate `text` to at most `max_chars` characters. Returns true when it was cut.
    pub fn cap_text(&mut self, max_chars: usize) -> bool {
        let keep = truncate_chars(&self.text, max_chars).len();
        if keep == self.text.len() {
            return false;
        }
        self.text.truncate(keep);
        true
    }

    /// Full metadata map as persisted: free-form meta plus provenance fields.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut m = self.meta.clone();
        m.insert(META_DOC_ID.to_string(), self.doc_id.0.clone());
        m.insert(META_SOURCE.to_string(), self.source_uri.clone());
        m.insert(META_SEQUENCE_INDEX.to_string(), self.sequence_index.to_string());
        if let Some(p) = self.page {
            m.insert(META_PAGE.to_string(), p.to_string());
        }
        m
    }

    pub fn to_retrieval_result(&self) -> RetrievalResult {
        RetrievalResult { content: self.text.clone(), meta: self.metadata() }
    }
}

/// A `(content, metadata)` pair returned by either index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub meta: BTreeMap<String, String>,
}

impl RetrievalResult {
    pub fn new(content: impl Into<String>, meta: BTreeMap<String, String>) -> Self {
        Self { content: content.into(), meta }
    }

    pub fn parent_content(&self) -> Option<&str> {
        self.meta.get(META_PARENT_CONTENT).map(String::as_str)
    }

    /// Text handed to the generator: the parent window, or the chunk itself when absent.
    pub fn grounding_text(&self) -> &str {
        self.parent_content().unwrap_or(&self.content)
    }

    pub fn source(&self) -> Option<&str> {
        self.meta.get(META_SOURCE).map(String::as_str)
    }

    pub fn sequence_index(&self) -> Option<u32> {
        self.meta.get(META_SEQUENCE_INDEX).and_then(|v| v.parse().ok())
    }
}

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Serialize a metadata map for storage.
pub fn meta_to_json(meta: &BTreeMap<String, String>) -> String {
    serde_json::to_string(meta).unwrap_or_else(|_| "{}".to_string())
}

/// Parse a stored metadata map; malformed input yields `None`.
pub fn meta_from_json(s: &str) -> Option<BTreeMap<String, String>> {
    serde_json::from_str(s).ok()
}
