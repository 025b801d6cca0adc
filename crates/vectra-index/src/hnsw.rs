//! HNSW (hierarchical navigable small world) strategy: a multi-layer
//! proximity graph addressed by dense row-index, with tombstone-based
//! soft delete and deterministic level sampling.

use std::collections::HashSet;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use vectra_core::metric::check_dim;
use vectra_core::rng::Xorshift32;
use vectra_core::{Metric, VectorId};
use vectra_store::core_store::Meta;
use vectra_store::CoreStore;

use crate::codec_ext::{read_block, read_u32_vec, write_block, write_u32_vec};
use crate::error::IndexError;
use crate::topk::{Candidate, MaxHeap, TopK};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub seed: u32,
    pub allow_replace_deleted: bool,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            seed: 42,
            allow_replace_deleted: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HnswHeader {
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    seed: u32,
    allow_replace_deleted: bool,
    entry_point: i64,
    max_level: i32,
}

pub struct HnswState {
    pub params: HnswParams,
    level_mult: f64,
    entry_point: i64,
    max_level: i32,
    levels: Vec<u8>,
    tombstone: Vec<bool>,
    // layers[l][row] = sorted neighbor row-indices at layer l.
    layers: Vec<Vec<Vec<u32>>>,
    rng: Xorshift32,
}

impl HnswState {
    pub fn new(params: HnswParams, capacity: usize) -> Self {
        let level_mult = 1.0 / (params.m as f64).ln();
        let seed = params.seed;
        Self {
            params,
            level_mult,
            entry_point: -1,
            max_level: -1,
            levels: vec![0; capacity],
            tombstone: vec![false; capacity],
            layers: Vec::new(),
            rng: Xorshift32::new(seed),
        }
    }

    pub fn entry_point(&self) -> i64 {
        self.entry_point
    }

    pub fn max_level(&self) -> i32 {
        self.max_level
    }

    pub fn is_tombstoned(&self, row: usize) -> bool {
        self.tombstone.get(row).copied().unwrap_or(false)
    }

    /// Fraction of `count` rows currently tombstoned.
    pub fn tombstone_ratio(&self, count: usize) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let dead = (0..count).filter(|&r| self.is_tombstoned(r)).count();
        dead as f64 / count as f64
    }

    /// Mean out-degree across layer 0 over `count` rows, the layer every
    /// live row always participates in.
    pub fn layer0_avg_degree(&self, count: usize) -> f64 {
        let Some(layer0) = self.layers.first() else {
            return 0.0;
        };
        if count == 0 {
            return 0.0;
        }
        let total: usize = (0..count).map(|r| layer0.get(r).map_or(0, Vec::len)).sum();
        total as f64 / count as f64
    }

    fn ensure_row_capacity(&mut self, rows: usize) {
        if self.levels.len() < rows {
            self.levels.resize(rows, 0);
            self.tombstone.resize(rows, false);
            for layer in &mut self.layers {
                layer.resize(rows, Vec::new());
            }
        }
    }

    fn ensure_layer(&mut self, layer: usize) {
        while self.layers.len() <= layer {
            self.layers.push(vec![Vec::new(); self.levels.len()]);
        }
    }

    fn sample_level(&mut self) -> usize {
        let u = self.rng.next_f64().max(f64::EPSILON);
        (-u.ln() * self.level_mult).floor().max(0.0) as usize
    }

    fn neighbors(&self, layer: usize, row: usize) -> &[u32] {
        self.layers
            .get(layer)
            .and_then(|l| l.get(row))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn greedy_descend(&self, entry: usize, query: &[f32], layer: usize, store: &CoreStore, metric: Metric) -> usize {
        let mut curr = entry;
        let mut curr_score = metric.score(query, store.vector_at(curr));
        loop {
            let mut improved = false;
            for &n in self.neighbors(layer, curr) {
                let n = n as usize;
                if self.tombstone[n] {
                    continue;
                }
                let score = metric.score(query, store.vector_at(n));
                if score > curr_score {
                    curr_score = score;
                    curr = n;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
        curr
    }

    /// Bounded best-first exploration. Tombstoned rows are traversed
    /// through (for connectivity) but never placed in the returned result.
    fn search_layer(
        &self,
        entry: usize,
        query: &[f32],
        ef: usize,
        layer: usize,
        store: &CoreStore,
        metric: Metric,
    ) -> Vec<Candidate> {
        let mut visited = HashSet::new();
        visited.insert(entry);
        let entry_score = metric.score(query, store.vector_at(entry));
        let mut frontier = MaxHeap::new();
        frontier.push(Candidate {
            row: entry,
            score: entry_score,
        });
        let mut result = Vec::new();
        if !self.tombstone[entry] {
            result.push(Candidate {
                row: entry,
                score: entry_score,
            });
        }

        while let Some(c) = frontier.pop_max() {
            if result.len() >= ef {
                let worst = result.last().map(|r| r.score).unwrap_or(f32::NEG_INFINITY);
                if c.score < worst {
                    break;
                }
            }
            for &n in self.neighbors(layer, c.row) {
                let n = n as usize;
                if !visited.insert(n) {
                    continue;
                }
                let score = metric.score(query, store.vector_at(n));
                frontier.push(Candidate { row: n, score });
                if !self.tombstone[n] {
                    insert_sorted_bounded(&mut result, Candidate { row: n, score }, ef);
                }
            }
        }

        result
    }

    /// Inserts row `idx` (already present in `store`) into the graph.
    pub fn insert(&mut self, idx: usize, store: &CoreStore, metric: Metric) {
        self.ensure_row_capacity(idx + 1);
        let level = self.sample_level();
        self.levels[idx] = level as u8;
        for l in 0..=level {
            self.ensure_layer(l);
        }

        if self.entry_point < 0 {
            self.entry_point = idx as i64;
            self.max_level = level as i32;
            return;
        }

        let query = store.vector_at(idx).to_vec();
        let mut curr = self.entry_point as usize;

        if self.max_level > level as i32 {
            for l in ((level as i32 + 1)..=self.max_level).rev() {
                curr = self.greedy_descend(curr, &query, l as usize, store, metric);
            }
        }

        let top_layer = (level as i32).min(self.max_level) as usize;
        for l in (0..=top_layer).rev() {
            let candidates = self.search_layer(curr, &query, self.params.ef_construction, l, store, metric);
            if let Some(best) = candidates.first() {
                curr = best.row;
            }
            let neighbors = select_best(&candidates, self.params.m, idx);
            self.connect(idx, l, &neighbors);
        }

        if level as i32 > self.max_level {
            self.entry_point = idx as i64;
            self.max_level = level as i32;
        }
    }

    fn connect(&mut self, idx: usize, layer: usize, neighbors: &[usize]) {
        {
            let list = &mut self.layers[layer][idx];
            for &n in neighbors {
                if !list.contains(&(n as u32)) {
                    list.push(n as u32);
                }
            }
            list.sort_unstable();
        }
        for &n in neighbors {
            let list = &mut self.layers[layer][n];
            if !list.contains(&(idx as u32)) {
                list.push(idx as u32);
            }
            if list.len() > self.params.m {
                list.sort_unstable();
                list.truncate(self.params.m);
            }
        }
        let list = &mut self.layers[layer][idx];
        if list.len() > self.params.m {
            list.sort_unstable();
            list.truncate(self.params.m);
        }
    }

    pub fn remove(&mut self, idx: usize) {
        if idx < self.tombstone.len() {
            self.tombstone[idx] = true;
        }
    }

    pub fn search(
        &self,
        store: &CoreStore,
        metric: Metric,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Fn(VectorId, &Meta) -> bool>,
        allowed_rows: Option<&RoaringBitmap>,
    ) -> Result<Vec<(VectorId, f32)>, IndexError> {
        check_dim(query, store.dim)?;
        if self.entry_point < 0 || store.count() == 0 {
            return Ok(Vec::new());
        }

        let mut curr = self.entry_point as usize;
        for l in (1..=self.max_level).rev() {
            curr = self.greedy_descend(curr, query, l as usize, store, metric);
        }

        let ef = self.params.ef_search.max(k);
        let candidates = self.search_layer(curr, query, ef, 0, store, metric);

        let mut top = TopK::new(k);
        for c in candidates {
            if let Some(rows) = allowed_rows {
                if !rows.contains(c.row as u32) {
                    continue;
                }
            }
            if let Some(f) = filter {
                let id = store.id_at(c.row);
                let meta = store.get_meta(id).cloned().unwrap_or(None);
                if !f(id, &meta) {
                    continue;
                }
            }
            top.push(c);
        }

        Ok(top
            .into_sorted()
            .into_iter()
            .map(|c| (store.id_at(c.row), c.score))
            .collect())
    }

    pub fn serialize(&self, count: usize) -> Vec<u8> {
        let header = HnswHeader {
            m: self.params.m,
            ef_construction: self.params.ef_construction,
            ef_search: self.params.ef_search,
            seed: self.params.seed,
            allow_replace_deleted: self.params.allow_replace_deleted,
            entry_point: self.entry_point,
            max_level: self.max_level,
        };
        let header_json = serde_json::to_vec(&header).expect("header always serializes");

        let mut out = Vec::new();
        write_block(&mut out, &header_json);
        write_block(&mut out, &self.levels[..count.min(self.levels.len())]);
        let tombstone_bytes: Vec<u8> = self.tombstone[..count.min(self.tombstone.len())]
            .iter()
            .map(|&b| b as u8)
            .collect();
        write_block(&mut out, &tombstone_bytes);

        write_u32_vec(&mut out, &[self.layers.len() as u32]);
        for layer in &self.layers {
            let mut offsets = Vec::with_capacity(count + 1);
            let mut neighbors = Vec::new();
            offsets.push(0u32);
            for row in 0..count {
                let list = layer.get(row).map(|v| v.as_slice()).unwrap_or(&[]);
                neighbors.extend_from_slice(list);
                offsets.push(neighbors.len() as u32);
            }
            write_u32_vec(&mut out, &offsets);
            write_u32_vec(&mut out, &neighbors);
        }
        out
    }

    pub fn deserialize(bytes: &[u8], params: HnswParams) -> Result<(Self, usize), IndexError> {
        let mut r = bytes;
        let header_json = read_block(&mut r)
            .map_err(|e| IndexError::FormatError(format!("hnsw header: {e}")))?;
        let header: HnswHeader = serde_json::from_slice(&header_json)?;
        let levels = read_block(&mut r).map_err(|e| IndexError::FormatError(e.to_string()))?;
        let tombstone_bytes =
            read_block(&mut r).map_err(|e| IndexError::FormatError(e.to_string()))?;
        let tombstone: Vec<bool> = tombstone_bytes.iter().map(|&b| b != 0).collect();
        let count = levels.len();

        let layer_count =
            read_u32_vec(&mut r, 1).map_err(|e| IndexError::FormatError(e.to_string()))?[0] as usize;
        let mut layers = Vec::with_capacity(layer_count);
        for _ in 0..layer_count {
            let offsets = read_u32_vec(&mut r, count + 1)
                .map_err(|e| IndexError::FormatError(e.to_string()))?;
            let total = *offsets.last().unwrap_or(&0) as usize;
            let flat = read_u32_vec(&mut r, total).map_err(|e| IndexError::FormatError(e.to_string()))?;
            let mut layer = Vec::with_capacity(count);
            for row in 0..count {
                let start = offsets[row] as usize;
                let end = offsets[row + 1] as usize;
                layer.push(flat[start..end].to_vec());
            }
            layers.push(layer);
        }

        let level_mult = 1.0 / (params.m as f64).ln();
        let state = HnswState {
            params: HnswParams {
                m: header.m,
                ef_construction: header.ef_construction,
                ef_search: header.ef_search,
                seed: header.seed,
                allow_replace_deleted: header.allow_replace_deleted,
            },
            level_mult,
            entry_point: header.entry_point,
            max_level: header.max_level,
            levels,
            tombstone,
            layers,
            rng: Xorshift32::new(header.seed),
        };
        Ok((state, count))
    }
}


fn insert_sorted_bounded(result: &mut Vec<Candidate>, candidate: Candidate, bound: usize) {
    let pos = result.partition_point(|c| c.score > candidate.score);
    result.insert(pos, candidate);
    if result.len() > bound {
        result.truncate(bound);
    }
}

/// Selects the best `m` non-self candidates by score, breaking ties by
/// insertion order (stable sort preserves discovery order for equal
/// scores).
fn select_best(candidates: &[Candidate], m: usize, self_row: usize) -> Vec<usize> {
    let mut filtered: Vec<Candidate> = candidates.iter().copied().filter(|c| c.row != self_row).collect();
    filtered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    filtered.truncate(m);
    filtered.into_iter().map(|c| c.row).collect()
}

/// Rebuilds a fresh store + graph containing only live (non-tombstoned)
/// rows, preserving relative id order. Returns the number of rows dropped.
pub fn compact_rebuild(store: &CoreStore, hnsw: &HnswState, metric: Metric) -> (CoreStore, HnswState, usize) {
    let live_count = (0..store.count()).filter(|&r| !hnsw.is_tombstoned(r)).count();
    let mut new_store = CoreStore::new(store.dim, metric, live_count.max(1));
    let mut new_hnsw = HnswState::new(hnsw.params, live_count.max(1));
    let mut removed = 0;

    for row in 0..store.count() {
        if hnsw.is_tombstoned(row) {
            removed += 1;
            continue;
        }
        let id = store.id_at(row);
        let vector = store.vector_at(row).to_vec();
        let meta = store.get_meta(id).cloned().unwrap_or(None);
        let outcome = new_store
            .insert_or_update(id, &vector, meta, false)
            .expect("rebuilt store has matching dim and no duplicate ids");
        new_hnsw.insert(outcome.index, &new_store, metric);
    }

    (new_store, new_hnsw, removed)
}
