use std::ops::Range;

use chunk_model::ChunkRecord;

/// Chunk range `[start, end)` forming the parent window of chunk `i` among `n`.
///
/// The window is centred on `i` and shifted left near the tail so it always
/// holds `min(window_size, n)` chunks.
pub fn window_bounds(i: usize, n: usize, window_size: usize) -> Range<usize> {
    let start0 = i.saturating_sub(window_size / 2);
    let end = n.min(start0.saturating_add(window_size));
    let start = end.saturating_sub(window_size);
    start..end
}

/// Newline-joined parent window text for chunk `i`; falls back to the chunk's own text.
pub fn parent_content_for(texts: &[&str], i: usize, window_size: usize) -> String {
    let parts: Vec<&str> = texts[window_bounds(i, texts.len(), window_size)]
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        texts[i].to_string()
    } else {
        parts.join("\n")
    }
}

/// Attach `parent_content` to every chunk of one document.
///
/// `chunks` must be the complete, contiguously numbered sequence of a single
/// document; windows never look past its ends.
pub fn attach_parent_windows(chunks: &mut [ChunkRecord], window_size: usize) {
    let parents: Vec<String> = {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        (0..texts.len()).map(|i| parent_content_for(&texts, i, window_size)).collect()
    };
    for (chunk, parent) in chunks.iter_mut().zip(parents) {
        chunk.set_parent_content(parent);
    }
}
