//! Recursive character splitter.
//!
//! Text is cut on the coarsest separator present (`"\n\n"`, then `"\n"`, then
//! `" "`, then single characters), keeping each separator at the start of the
//! piece that follows it. Pieces shorter than `chunk_size` are merged greedily;
//! when a chunk is emitted, trailing pieces totalling at most `chunk_overlap`
//! characters are carried into the next one. All lengths are in characters.

use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, keeping it at the start of every piece but the first.
/// An empty separator splits into single characters. Empty pieces are dropped.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }
    let mut out = Vec::new();
    let mut last = 0usize;
    for (idx, _) in text.match_indices(separator) {
        out.push(&text[last..idx]);
        last = idx;
    }
    out.push(&text[last..]);
    out.retain(|s| !s.is_empty());
    out
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// A zero size or an overlap that swallows the whole window cannot make progress.
    pub fn is_degenerate(&self) -> bool {
        self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size
    }

    /// Split `text` into trimmed, non-empty chunks. Degenerate settings yield nothing.
    pub fn split(&self, text: &str) -> Vec<String> {
        if self.is_degenerate() {
            return Vec::new();
        }
        let mut chunks = self.split_recursive(text, &DEFAULT_SEPARATORS);
        for c in chunks.iter_mut() {
            let trimmed = c.trim();
            if trimmed.len() != c.len() { *c = trimmed.to_string(); }
        }
        chunks.retain(|c| !c.is_empty());
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = s;
                break;
            }
            if text.contains(s) {
                separator = s;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut final_chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(&good));
                good.clear();
            }
            if finer.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good));
        }
        final_chunks
    }

    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);
                // Drop leading pieces until what remains fits the overlap budget.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => { total = 0; break; }
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }
        push_joined(&mut docs, &current);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, pieces: &VecDeque<&str>) {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}
