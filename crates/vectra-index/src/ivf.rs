//! IVF (inverted-file) strategy: centroids plus per-cluster posting lists,
//! probing the top-`nprobe` clusters at query time and refined offline by
//! k-means training.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use vectra_core::metric::{check_dim, normalize_l2};
use vectra_core::rng::Xorshift32;
use vectra_core::{Metric, VectorId};
use vectra_store::core_store::Meta;
use vectra_store::CoreStore;

use crate::bruteforce;
use crate::codec_ext::{read_block, write_block};
use crate::error::IndexError;
use crate::topk::{Candidate, TopK};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvfParams {
    pub nlist: usize,
    pub nprobe: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self { nlist: 16, nprobe: 4 }
    }
}

impl IvfParams {
    pub fn clamped_nprobe(&self) -> usize {
        self.nprobe.clamp(1, self.nlist.max(1))
    }
}

pub struct IvfState {
    pub params: IvfParams,
    dim: usize,
    centroid_count: usize,
    centroids: Vec<f32>,
    lists: Vec<Vec<VectorId>>,
    id_to_list: std::collections::HashMap<VectorId, usize>,
}

impl IvfState {
    pub fn new(params: IvfParams, dim: usize) -> Self {
        let nlist = params.nlist.max(1);
        Self {
            params,
            dim,
            centroid_count: 0,
            centroids: vec![0.0; nlist * dim],
            lists: vec![Vec::new(); nlist],
            id_to_list: std::collections::HashMap::new(),
        }
    }

    pub fn centroid_count(&self) -> usize {
        self.centroid_count
    }

    /// Posting-list length per cluster, for imbalance diagnostics.
    pub fn list_lens(&self) -> Vec<usize> {
        self.lists[..self.centroid_count].iter().map(Vec::len).collect()
    }

    fn centroid(&self, i: usize) -> &[f32] {
        let off = i * self.dim;
        &self.centroids[off..off + self.dim]
    }

    fn centroid_mut(&mut self, i: usize) -> &mut [f32] {
        let off = i * self.dim;
        &mut self.centroids[off..off + self.dim]
    }

    fn nearest_centroid(&self, query: &[f32], metric: Metric) -> usize {
        let mut best = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for i in 0..self.centroid_count {
            let score = metric.score(query, self.centroid(i));
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    pub fn insert(&mut self, id: VectorId, vector: &[f32], metric: Metric) -> Result<(), IndexError> {
        check_dim(vector, self.dim)?;
        if self.centroid_count < self.params.nlist.max(1) {
            let idx = self.centroid_count;
            self.centroid_mut(idx).copy_from_slice(vector);
            self.centroid_count += 1;
            self.lists[idx].push(id);
            self.id_to_list.insert(id, idx);
            return Ok(());
        }
        let list_idx = self.nearest_centroid(vector, metric);
        self.lists[list_idx].push(id);
        self.id_to_list.insert(id, list_idx);
        Ok(())
    }

    pub fn remove(&mut self, id: VectorId) {
        if let Some(list_idx) = self.id_to_list.remove(&id) {
            self.lists[list_idx].retain(|&x| x != id);
        }
    }

    pub fn search(
        &self,
        store: &CoreStore,
        metric: Metric,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Fn(VectorId, &Meta) -> bool>,
    ) -> Result<Vec<(VectorId, f32)>, IndexError> {
        check_dim(query, self.dim)?;
        if self.centroid_count == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = (0..self.centroid_count)
            .map(|i| (i, metric.score(query, self.centroid(i))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let nprobe = self.params.clamped_nprobe().min(self.centroid_count);

        let mut top = TopK::new(k);
        for &(cluster, _) in scored.iter().take(nprobe) {
            for &id in &self.lists[cluster] {
                let Some(row) = store.index_of(id) else { continue };
                if let Some(f) = filter {
                    let meta = store.get_meta(id).cloned().unwrap_or(None);
                    if !f(id, &meta) {
                        continue;
                    }
                }
                let score = metric.score(query, store.vector_at(row));
                top.push(Candidate { row, score });
            }
        }

        Ok(top
            .into_sorted()
            .into_iter()
            .map(|c| (store.id_at(c.row), c.score))
            .collect())
    }

    /// Seeds `nlist` distinct rows at random (duplicating if the store has
    /// fewer rows than `nlist`), then refines centroids for `iterations`
    /// rounds of Lloyd's algorithm.
    pub fn train(&mut self, store: &CoreStore, metric: Metric, seed: u32, iterations: usize) {
        let nlist = self.params.nlist.max(1);
        if store.count() == 0 {
            return;
        }
        let mut rng = Xorshift32::new(seed);
        let mut seeded = Vec::with_capacity(nlist);
        let mut seen = std::collections::HashSet::new();
        while seeded.len() < nlist {
            let row = rng.next_below(store.count() as u32) as usize;
            if store.count() > nlist && !seen.insert(row) {
                continue;
            }
            seeded.push(row);
            if store.count() <= nlist {
                // allow duplicates when there are fewer rows than clusters
                seen.insert(row);
            }
        }

        self.centroids = vec![0.0; nlist * self.dim];
        for (i, &row) in seeded.iter().enumerate() {
            self.centroid_mut(i).copy_from_slice(store.vector_at(row));
        }
        self.centroid_count = nlist;

        for _ in 0..iterations {
            let mut sums = vec![0.0f32; nlist * self.dim];
            let mut counts = vec![0usize; nlist];
            for row in 0..store.count() {
                let vector = store.vector_at(row);
                let nearest = self.nearest_centroid(vector, metric);
                counts[nearest] += 1;
                let off = nearest * self.dim;
                for d in 0..self.dim {
                    sums[off + d] += vector[d];
                }
            }
            for i in 0..nlist {
                if counts[i] == 0 {
                    continue; // empty clusters keep their previous centroid
                }
                let off = i * self.dim;
                for d in 0..self.dim {
                    self.centroids[off + d] = sums[off + d] / counts[i] as f32;
                }
                if !matches!(metric, Metric::L2) {
                    normalize_l2(self.centroid_mut(i));
                }
            }
        }

        self.reassign(store, metric);
    }

    /// Clears all posting lists and reassigns every row to its nearest
    /// centroid.
    pub fn reassign(&mut self, store: &CoreStore, metric: Metric) {
        for list in &mut self.lists {
            list.clear();
        }
        self.id_to_list.clear();
        for row in 0..store.count() {
            let id = store.id_at(row);
            let nearest = self.nearest_centroid(store.vector_at(row), metric);
            self.lists[nearest].push(id);
            self.id_to_list.insert(id, nearest);
        }
    }

    pub fn total_listed(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Mean recall and mean latency (ms) of this IVF index against
    /// brute-force on the same store, over `queries`.
    pub fn evaluate(&self, store: &CoreStore, metric: Metric, queries: &[Vec<f32>], k: usize) -> (f64, f64) {
        if queries.is_empty() {
            return (0.0, 0.0);
        }
        let mut recall_sum = 0.0;
        let mut latency_sum_ms = 0.0;
        for q in queries {
            let started = Instant::now();
            let ivf_hits = self.search(store, metric, q, k, None).unwrap_or_default();
            latency_sum_ms += started.elapsed().as_secs_f64() * 1000.0;

            let bf_hits = bruteforce::search(store, metric, q, k, None).unwrap_or_default();
            let bf_ids: std::collections::HashSet<_> =
                bruteforce::resolve_ids(store, &bf_hits).into_iter().map(|(id, _)| id).collect();
            if bf_ids.is_empty() {
                continue;
            }
            let hits = ivf_hits.iter().filter(|(id, _)| bf_ids.contains(id)).count();
            recall_sum += hits as f64 / bf_ids.len() as f64;
        }
        (recall_sum / queries.len() as f64, latency_sum_ms / queries.len() as f64)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.params.nlist as u32).to_le_bytes());
        out.extend_from_slice(&(self.params.nprobe as u32).to_le_bytes());
        out.extend_from_slice(&(self.centroid_count as u32).to_le_bytes());
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());

        let lists_json = serde_json::to_vec(&self.lists).expect("posting lists always serialize");
        write_block(&mut out, &lists_json);

        for f in &self.centroids {
            out.extend_from_slice(&f.to_le_bytes());
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < 16 {
            return Err(IndexError::FormatError("ivf header truncated".to_string()));
        }
        let nlist = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let nprobe = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let centroid_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let serialized_dim = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;

        let mut r = &bytes[16..];
        let lists_json = read_block(&mut r).map_err(|e| IndexError::FormatError(e.to_string()))?;
        let lists: Vec<Vec<VectorId>> = serde_json::from_slice(&lists_json)?;

        let mut id_to_list = std::collections::HashMap::new();
        for (i, list) in lists.iter().enumerate() {
            for &id in list {
                id_to_list.insert(id, i);
            }
        }

        let expected_floats = nlist * serialized_dim;
        let mut centroids = vec![0.0f32; expected_floats];
        for (i, chunk) in r.chunks_exact(4).take(expected_floats).enumerate() {
            centroids[i] = f32::from_le_bytes(chunk.try_into().unwrap());
        }

        Ok(IvfState {
            params: IvfParams { nlist, nprobe },
            dim: serialized_dim,
            centroid_count,
            centroids,
            lists,
            id_to_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(metric: Metric) -> (CoreStore, IvfState) {
        let mut store = CoreStore::new(2, metric, 8);
        let mut ivf = IvfState::new(IvfParams { nlist: 2, nprobe: 2 }, 2);
        for (id, vector) in [
            (1u32, vec![1.0, 0.0]),
            (2, vec![0.9, 0.1]),
            (3, vec![0.0, 1.0]),
            (4, vec![0.1, 0.9]),
        ] {
            store.insert_or_update(id, &vector, None, false).unwrap();
            ivf.insert(id, store.get(id).unwrap(), metric).unwrap();
        }
        (store, ivf)
    }

    #[test]
    fn list_total_matches_count() {
        let (store, ivf) = fixture(Metric::Dot);
        assert_eq!(ivf.total_listed(), store.count());
    }

    #[test]
    fn search_finds_nearest_cluster() {
        let (store, ivf) = fixture(Metric::Dot);
        let results = ivf.search(&store, Metric::Dot, &[1.0, 0.0], 2, None).unwrap();
        let ids: std::collections::HashSet<_> = results.into_iter().map(|(id, _)| id).collect();
        assert!(ids.contains(&1));
    }

    #[test]
    fn remove_updates_list_total() {
        let (store, mut ivf) = fixture(Metric::Dot);
        ivf.remove(1);
        assert_eq!(ivf.total_listed(), store.count() - 1);
    }

    #[test]
    fn train_then_reassign_keeps_list_total_invariant() {
        let (store, mut ivf) = fixture(Metric::Dot);
        ivf.train(&store, Metric::Dot, 7, 5);
        assert_eq!(ivf.total_listed(), store.count());
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let (store, mut ivf) = fixture(Metric::Dot);
        ivf.train(&store, Metric::Dot, 7, 3);
        let bytes = ivf.serialize();
        let restored = IvfState::deserialize(&bytes).unwrap();
        assert_eq!(restored.total_listed(), ivf.total_listed());
        assert_eq!(restored.centroid_count, ivf.centroid_count);
    }

    #[test]
    fn dim_mismatch_rejected() {
        let (store, ivf) = fixture(Metric::Dot);
        assert!(ivf.search(&store, Metric::Dot, &[1.0], 1, None).is_err());
    }
}
