//! Authoritative in-memory tabular storage of `(id, vector, meta)` triples.
//!
//! `CoreStore` has no awareness of any particular ANN strategy; it only
//! guarantees O(1) lookup by id and contiguous, SIMD-friendly column
//! storage. Strategies address rows by dense row-index, which `CoreStore`
//! keeps stable except across [`CoreStore::remove_by_id`], whose
//! swap-with-last compaction callers must react to.

use std::collections::HashMap;

use vectra_core::metric::{check_dim, normalize_l2};
use vectra_core::{Metric, VectorId};

use crate::error::StoreError;

/// Opaque metadata payload. Stored and round-tripped as raw bytes; the core
/// never inspects its contents.
pub type Meta = Option<Vec<u8>>;

/// Outcome of [`CoreStore::insert_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub index: usize,
    pub created: bool,
}

/// Outcome of [`CoreStore::remove_by_id`] describing the swap-with-last
/// compaction that occurred, if any row had to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub moved_id: Option<VectorId>,
    pub moved_from: Option<usize>,
    pub moved_to: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CoreStore {
    pub dim: usize,
    pub metric: Metric,
    capacity: usize,
    count: usize,
    ids: Vec<VectorId>,
    vectors: Vec<f32>,
    metas: Vec<Meta>,
    id_to_index: HashMap<VectorId, usize>,
}

impl CoreStore {
    pub fn new(dim: usize, metric: Metric, initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        Self {
            dim,
            metric,
            capacity,
            count: 0,
            ids: vec![0; capacity],
            vectors: vec![0.0; capacity * dim],
            metas: vec![None; capacity],
            id_to_index: HashMap::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.id_to_index.contains_key(&id)
    }

    pub fn index_of(&self, id: VectorId) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    pub fn id_at(&self, index: usize) -> VectorId {
        self.ids[index]
    }

    pub fn vector_at(&self, index: usize) -> &[f32] {
        let off = index * self.dim;
        &self.vectors[off..off + self.dim]
    }

    pub fn vectors_buffer(&self) -> &[f32] {
        &self.vectors
    }

    /// Doubles capacity while `count + extra > capacity`. Returns whether it
    /// grew.
    pub fn ensure(&mut self, extra: usize) -> bool {
        let mut grew = false;
        while self.count + extra > self.capacity {
            self.capacity *= 2;
            self.ids.resize(self.capacity, 0);
            self.vectors.resize(self.capacity * self.dim, 0.0);
            self.metas.resize(self.capacity, None);
            grew = true;
        }
        grew
    }

    /// Inserts a new id or, when `upsert` is set and the id already exists,
    /// overwrites its vector and meta in place.
    pub fn insert_or_update(
        &mut self,
        id: VectorId,
        vector: &[f32],
        meta: Meta,
        upsert: bool,
    ) -> Result<InsertOutcome, StoreError> {
        check_dim(vector, self.dim)?;

        if let Some(&index) = self.id_to_index.get(&id) {
            if !upsert {
                return Err(StoreError::duplicate(id));
            }
            self.write_row(index, vector);
            self.metas[index] = meta;
            return Ok(InsertOutcome {
                index,
                created: false,
            });
        }

        self.ensure(1);
        let index = self.count;
        self.ids[index] = id;
        self.write_row(index, vector);
        self.metas[index] = meta;
        self.id_to_index.insert(id, index);
        self.count += 1;
        Ok(InsertOutcome {
            index,
            created: true,
        })
    }

    fn write_row(&mut self, index: usize, vector: &[f32]) {
        let off = index * self.dim;
        self.vectors[off..off + self.dim].copy_from_slice(vector);
        if self.metric.requires_normalization() {
            normalize_l2(&mut self.vectors[off..off + self.dim]);
        }
    }

    /// Swap-with-last removal. Returns `None` if `id` is absent.
    pub fn remove_by_id(&mut self, id: VectorId) -> Option<RemoveOutcome> {
        let index = self.id_to_index.remove(&id)?;
        let last = self.count - 1;
        if index == last {
            self.count -= 1;
            return Some(RemoveOutcome {
                moved_id: None,
                moved_from: None,
                moved_to: None,
            });
        }
        let moved_id = self.ids[last];
        self.ids[index] = moved_id;
        let (src_off, dst_off) = (last * self.dim, index * self.dim);
        for i in 0..self.dim {
            self.vectors[dst_off + i] = self.vectors[src_off + i];
        }
        self.metas[index] = self.metas[last].take();
        self.id_to_index.insert(moved_id, index);
        self.count -= 1;
        Some(RemoveOutcome {
            moved_id: Some(moved_id),
            moved_from: Some(last),
            moved_to: Some(index),
        })
    }

    pub fn get(&self, id: VectorId) -> Option<&[f32]> {
        self.index_of(id).map(|i| self.vector_at(i))
    }

    pub fn get_meta(&self, id: VectorId) -> Option<&Meta> {
        self.index_of(id).map(|i| &self.metas[i])
    }

    pub fn update_meta(&mut self, id: VectorId, meta: Meta) -> Result<(), StoreError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| StoreError::Core(vectra_core::CoreError::NotFound(id)))?;
        self.metas[index] = meta;
        Ok(())
    }

    /// Returns a normalized copy of `query` when the store's metric is
    /// cosine; otherwise returns `query` unchanged via an owned copy so the
    /// caller has a uniform return type.
    pub fn normalize_query(&self, query: &[f32]) -> Vec<f32> {
        let mut q = query.to_vec();
        if self.metric.requires_normalization() {
            normalize_l2(&mut q);
        }
        q
    }

    /// Rebuilds the id→row-index map after bulk-loading `ids`/`vectors`
    /// directly (used by segment rehydration during open/rebuild).
    pub fn restore_from_deserialized(&mut self, count: usize) {
        self.count = count;
        self.id_to_index.clear();
        for i in 0..count {
            self.id_to_index.insert(self.ids[i], i);
        }
    }

    pub fn ids_slice_mut(&mut self) -> &mut [VectorId] {
        &mut self.ids
    }

    pub fn vectors_slice_mut(&mut self) -> &mut [f32] {
        &mut self.vectors
    }

    pub fn metas_slice_mut(&mut self) -> &mut [Meta] {
        &mut self.metas
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (VectorId, &[f32], &Meta)> {
        (0..self.count).map(move |i| (self.ids[i], self.vector_at(i), &self.metas[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(metric: Metric) -> CoreStore {
        CoreStore::new(3, metric, 2)
    }

    #[test]
    fn insert_then_get() {
        let mut s = store(Metric::Dot);
        let out = s
            .insert_or_update(1, &[1.0, 2.0, 3.0], Some(b"m".to_vec()), false)
            .unwrap();
        assert!(out.created);
        assert_eq!(s.get(1), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(s.get_meta(1).unwrap().as_deref(), Some(&b"m"[..]));
    }

    #[test]
    fn duplicate_without_upsert_fails() {
        let mut s = store(Metric::Dot);
        s.insert_or_update(1, &[1.0, 0.0, 0.0], None, false).unwrap();
        let err = s
            .insert_or_update(1, &[0.0, 1.0, 0.0], None, false)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Core(vectra_core::CoreError::Duplicate(1))
        ));
    }

    #[test]
    fn upsert_overwrites() {
        let mut s = store(Metric::Dot);
        s.insert_or_update(1, &[1.0, 0.0, 0.0], None, false).unwrap();
        let out = s
            .insert_or_update(1, &[0.0, 1.0, 0.0], None, true)
            .unwrap();
        assert!(!out.created);
        assert_eq!(s.get(1), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[test]
    fn dim_mismatch_rejected() {
        let mut s = store(Metric::Dot);
        let err = s.insert_or_update(1, &[1.0, 0.0], None, false).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Core(vectra_core::CoreError::DimMismatch { .. })
        ));
    }

    #[test]
    fn cosine_normalizes_on_insert() {
        let mut s = store(Metric::Cosine);
        s.insert_or_update(1, &[3.0, 4.0, 0.0], None, false).unwrap();
        let v = s.get(1).unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn remove_swaps_with_last() {
        let mut s = store(Metric::Dot);
        s.insert_or_update(1, &[1.0, 0.0, 0.0], None, false).unwrap();
        s.insert_or_update(2, &[0.0, 1.0, 0.0], None, false).unwrap();
        s.insert_or_update(3, &[0.0, 0.0, 1.0], None, false).unwrap();
        let outcome = s.remove_by_id(1).unwrap();
        assert_eq!(outcome.moved_id, Some(3));
        assert_eq!(s.count(), 2);
        assert!(!s.contains(1));
        assert_eq!(s.get(3), Some(&[0.0, 0.0, 1.0][..]));
        assert_eq!(s.get(2), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[test]
    fn remove_absent_returns_none() {
        let mut s = store(Metric::Dot);
        assert!(s.remove_by_id(99).is_none());
    }

    #[test]
    fn ensure_grows_capacity_and_preserves_rows() {
        let mut s = store(Metric::Dot);
        for id in 1..=5u32 {
            s.insert_or_update(id, &[id as f32, 0.0, 0.0], None, false)
                .unwrap();
        }
        assert!(s.capacity() >= 5);
        for id in 1..=5u32 {
            assert_eq!(s.get(id), Some(&[id as f32, 0.0, 0.0][..]));
        }
    }
}
