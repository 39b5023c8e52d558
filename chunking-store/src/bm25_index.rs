//! Okapi BM25 over an in-memory corpus.
//!
//! The index is cheap to build and is rebuilt from a store snapshot for every
//! lexical query rather than maintained incrementally.

use std::collections::HashMap;

use chunk_model::RetrievalResult;

use crate::segmenter::TextSegmenter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

struct Doc {
    tf: HashMap<String, u32>,
    len: usize,
}

pub struct Bm25Index {
    params: Bm25Params,
    docs: Vec<Doc>,
    entries: Vec<RetrievalResult>,
    df: HashMap<String, usize>,
    avgdl: f32,
}

impl Bm25Index {
    /// Tokenize and index `entries`; their order is the tie-break order.
    pub fn build(entries: Vec<RetrievalResult>, segmenter: &dyn TextSegmenter, params: Bm25Params) -> Self {
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut docs = Vec::with_capacity(entries.len());
        for entry in &entries {
            let tokens = segmenter.segment(&entry.content);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for t in &tokens {
                *tf.entry(t.clone()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            docs.push(Doc { tf, len: tokens.len() });
        }
        let total: usize = docs.iter().map(|d| d.len).sum();
        let avgdl = if docs.is_empty() { 0.0 } else { total as f32 / docs.len() as f32 };
        Self { params, docs, entries, df, avgdl }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Non-negative inverse document frequency.
    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = self.df.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of every indexed entry for the query tokens.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let Bm25Params { k1, b } = self.params;
        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };
        self.docs
            .iter()
            .map(|doc| {
                query_tokens
                    .iter()
                    .filter_map(|q| doc.tf.get(q).map(|&f| (q, f as f32)))
                    .map(|(q, f)| {
                        let norm = k1 * (1.0 - b + b * doc.len as f32 / avgdl);
                        self.idf(q) * f * (k1 + 1.0) / (f + norm)
                    })
                    .sum()
            })
            .collect()
    }

    /// The `top_k` entries with a strictly positive score, best first.
    pub fn search(&self, query: &str, segmenter: &dyn TextSegmenter, top_k: usize) -> Vec<(RetrievalResult, f32)> {
        if top_k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let query_tokens = segmenter.segment(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut ranked: Vec<(usize, f32)> = self
            .scores(&query_tokens)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);
        ranked.into_iter().map(|(i, s)| (self.entries[i].clone(), s)).collect()
    }
}
