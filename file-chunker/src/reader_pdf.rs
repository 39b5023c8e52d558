use lopdf::Document;
use tracing::{debug, warn};

use crate::unified_blocks::UnifiedBlock;
use crate::ChunkError;

/// Pure-Rust PDF reader: one block per page, text extracted with `lopdf`.
///
/// A page whose content stream cannot be decoded is skipped with a warning; if
/// every page fails the caller sees an empty document rather than a read error.
pub fn read_pdf_to_blocks(path: &str) -> Result<Vec<UnifiedBlock>, ChunkError> {
    let doc = Document::load(path).map_err(|err| ChunkError::Extraction {
        path: path.to_string(),
        message: err.to_string(),
    })?;

    let pages = doc.get_pages();
    let mut out = Vec::with_capacity(pages.len());
    for (page_num, _page_id) in pages.into_iter() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => out.push(UnifiedBlock::new(text).with_page(page_num)),
            Err(err) => warn!(path, page = page_num, error = %err, "skipping unreadable pdf page"),
        }
    }
    debug!(path, pages = out.len(), "pdf pages extracted");
    Ok(out)
}
