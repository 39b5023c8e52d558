use hnsw_rs::prelude::*;

const MAX_NB_CONN: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const NB_LAYERS: usize = 16;

/// Minimum capacity of a freshly built graph.
pub const MIN_CAPACITY: usize = 10_000;

/// In-memory HNSW graph (cosine distance) labelled by store rowid.
///
/// The graph only grows; `loaded_upto` tracks the highest rowid inserted so
/// the owner can catch up incrementally from the store.
pub struct HnswIndex {
    dim: usize,
    capacity: usize,
    hnsw: Hnsw<'static, f32, DistCosine>,
    len: usize,
    loaded_upto: i64,
}

impl HnswIndex {
    pub fn new(dim: usize, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let hnsw = Hnsw::<f32, DistCosine>::new(MAX_NB_CONN, capacity, NB_LAYERS, EF_CONSTRUCTION, DistCosine {});
        Self { dim, capacity, hnsw, len: 0, loaded_upto: 0 }
    }

    pub fn dimension(&self) -> usize { self.dim }
    pub fn capacity(&self) -> usize { self.capacity }
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn loaded_upto(&self) -> i64 { self.loaded_upto }

    /// Whether `additional` more vectors still fit.
    pub fn has_room_for(&self, additional: usize) -> bool {
        self.len + additional <= self.capacity
    }

    /// Insert `(rowid, vector)` pairs in rowid order.
    ///
    /// Zero vectors carry no direction and are only counted towards
    /// `loaded_upto`; vectors of the wrong dimension are skipped the same way.
    pub fn insert(&mut self, items: &[(i64, Vec<f32>)]) {
        for (rowid, v) in items {
            if v.len() == self.dim && !is_zero(v) {
                self.hnsw.insert((&v[..], *rowid as usize));
                self.len += 1;
            }
            self.loaded_upto = self.loaded_upto.max(*rowid);
        }
    }

    /// Up to `k` nearest rowids with their cosine similarity, most similar first.
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<(i64, f32)> {
        if k == 0 || self.len == 0 || query.len() != self.dim || is_zero(query) {
            return Vec::new();
        }
        let mut hits: Vec<(i64, f32)> = self
            .hnsw
            .search(query, k, ef_search.max(k))
            .into_iter()
            .map(|n| (n.d_id as i64, 1.0 - n.distance))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        hits
    }
}

pub fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}
