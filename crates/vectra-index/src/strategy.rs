//! Strategy dispatch: a single enum wrapping whichever ANN strategy a
//! segment was built with, plus the filtered-search combination rules that
//! decide how a predicate interacts with each strategy's traversal.

use serde_json::Value;
use vectra_core::strategy::Strategy;
use vectra_core::{Metric, VectorId};
use vectra_store::core_store::Meta;
use vectra_store::CoreStore;

use crate::bruteforce;
use crate::error::IndexError;
use crate::filter::{AttributeIndexReader, AttrsAccessor, FilterExpr};
use crate::hnsw::{HnswParams, HnswState};
use crate::ivf::{IvfParams, IvfState};

pub enum StrategyState {
    Bruteforce,
    Hnsw(HnswState),
    Ivf(IvfState),
}

impl StrategyState {
    pub fn new(strategy: Strategy, hnsw_params: HnswParams, ivf_params: IvfParams, dim: usize, capacity: usize) -> Self {
        match strategy {
            Strategy::Bruteforce => StrategyState::Bruteforce,
            Strategy::Hnsw => StrategyState::Hnsw(HnswState::new(hnsw_params, capacity)),
            Strategy::Ivf => StrategyState::Ivf(IvfState::new(ivf_params, dim)),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            StrategyState::Bruteforce => Strategy::Bruteforce,
            StrategyState::Hnsw(_) => Strategy::Hnsw,
            StrategyState::Ivf(_) => Strategy::Ivf,
        }
    }

    /// Registers a freshly-inserted row `idx`/`id` with this strategy's
    /// auxiliary state. Brute-force has none.
    pub fn add(&mut self, idx: usize, id: VectorId, vector: &[f32], store: &CoreStore, metric: Metric) -> Result<(), IndexError> {
        match self {
            StrategyState::Bruteforce => Ok(()),
            StrategyState::Hnsw(hnsw) => {
                hnsw.insert(idx, store, metric);
                Ok(())
            }
            StrategyState::Ivf(ivf) => ivf.insert(id, vector, metric),
        }
    }

    /// Retires row `idx`/`id`. HNSW tombstones in place (no rewiring); IVF
    /// drops the id from its posting list; brute-force needs nothing since
    /// it scans whatever rows the store still has.
    pub fn remove(&mut self, idx: usize, id: VectorId) {
        match self {
            StrategyState::Bruteforce => {}
            StrategyState::Hnsw(hnsw) => hnsw.remove(idx),
            StrategyState::Ivf(ivf) => ivf.remove(id),
        }
    }
}

fn decode_meta(meta: &Meta) -> Option<Value> {
    meta.as_deref().and_then(|bytes| serde_json::from_slice::<Value>(bytes).ok())
}

/// Searches `state`, optionally combined with a filter expression.
///
/// - No expression: each strategy's own unfiltered search.
/// - Expression that preselection can fully resolve against `reader`: a
///   "hard filter" — the candidate row set is scored directly (brute-force
///   style), bypassing graph traversal entirely for HNSW.
/// - Expression preselection can't resolve: a "soft filter" — the
///   strategy traverses its own structure (the HNSW graph, IVF's probed
///   clusters) and the full predicate is evaluated per candidate instead.
pub fn search(
    state: &StrategyState,
    store: &CoreStore,
    metric: Metric,
    query: &[f32],
    k: usize,
    expr: Option<&FilterExpr>,
    attrs: &dyn AttrsAccessor,
    reader: &dyn AttributeIndexReader,
) -> Result<Vec<(VectorId, f32)>, IndexError> {
    let preselected = expr.and_then(|e| crate::filter::preselect(e, reader));

    let full_predicate = |id: VectorId, meta: &Meta| -> bool {
        match expr {
            Some(e) => e.eval(id, decode_meta(meta).as_ref(), attrs),
            None => true,
        }
    };

    match state {
        StrategyState::Bruteforce => {
            let allowed_rows: Option<Vec<usize>> =
                preselected.as_ref().map(|set| set.iter().filter_map(|id| store.index_of(id)).collect());
            let mut candidates = bruteforce::search(store, metric, query, k, allowed_rows.as_deref())?;
            if expr.is_some() {
                candidates.retain(|c| {
                    let id = store.id_at(c.row);
                    let meta = store.get_meta(id).cloned().unwrap_or(None);
                    full_predicate(id, &meta)
                });
            }
            Ok(bruteforce::resolve_ids(store, &candidates))
        }
        StrategyState::Hnsw(hnsw) => {
            if let Some(set) = &preselected {
                let allowed_rows: Vec<usize> = set.iter().filter_map(|id| store.index_of(id)).collect();
                let candidates = bruteforce::search(store, metric, query, k, Some(&allowed_rows))?;
                Ok(bruteforce::resolve_ids(store, &candidates))
            } else if expr.is_some() {
                let filter_fn: &dyn Fn(VectorId, &Meta) -> bool = &full_predicate;
                hnsw.search(store, metric, query, k, Some(filter_fn), None)
            } else {
                hnsw.search(store, metric, query, k, None, None)
            }
        }
        StrategyState::Ivf(ivf) => {
            if let Some(set) = &preselected {
                let allowed_ids = set;
                let filter_fn: &dyn Fn(VectorId, &Meta) -> bool = &|id, meta| allowed_ids.contains(id) && full_predicate(id, meta);
                ivf.search(store, metric, query, k, Some(filter_fn))
            } else if expr.is_some() {
                let filter_fn: &dyn Fn(VectorId, &Meta) -> bool = &full_predicate;
                ivf.search(store, metric, query, k, Some(filter_fn))
            } else {
                ivf.search(store, metric, query, k, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{NoAttrs, RangeBounds, Scope};
    use serde_json::json;

    struct NoIndex;
    impl AttributeIndexReader for NoIndex {
        fn eq(&self, _key: &str, _value: &Value) -> Option<roaring::RoaringBitmap> {
            None
        }
        fn exists(&self, _key: &str) -> Option<roaring::RoaringBitmap> {
            None
        }
        fn range(&self, _key: &str, _range: RangeBounds) -> Option<roaring::RoaringBitmap> {
            None
        }
    }

    fn fixture(strategy: Strategy) -> (CoreStore, StrategyState) {
        let mut store = CoreStore::new(2, Metric::Dot, 8);
        let mut state = StrategyState::new(strategy, HnswParams::default(), IvfParams { nlist: 2, nprobe: 2 }, 2, 8);
        let rows = [
            (1u32, vec![1.0, 0.0], json!({"color": "red"})),
            (2, vec![0.9, 0.1], json!({"color": "blue"})),
            (3, vec![0.0, 1.0], json!({"color": "red"})),
        ];
        for (id, vector, meta) in rows {
            let meta_bytes = serde_json::to_vec(&meta).unwrap();
            let outcome = store.insert_or_update(id, &vector, Some(meta_bytes), false).unwrap();
            state.add(outcome.index, id, &vector, &store, Metric::Dot).unwrap();
        }
        (store, state)
    }

    #[test]
    fn bruteforce_soft_filter_applies_full_predicate() {
        let (store, state) = fixture(Strategy::Bruteforce);
        let expr = FilterExpr::leaf_match("color", Scope::Meta, json!("red"));
        let results = search(&state, &store, Metric::Dot, &[1.0, 0.0], 3, Some(&expr), &NoAttrs, &NoIndex).unwrap();
        let ids: std::collections::HashSet<_> = results.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, std::collections::HashSet::from([1, 3]));
    }

    #[test]
    fn hnsw_soft_filter_applies_full_predicate() {
        let (store, state) = fixture(Strategy::Hnsw);
        let expr = FilterExpr::leaf_match("color", Scope::Meta, json!("blue"));
        let results = search(&state, &store, Metric::Dot, &[1.0, 0.0], 3, Some(&expr), &NoAttrs, &NoIndex).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 2);
    }

    #[test]
    fn hard_filter_via_has_id_bypasses_predicate_scan() {
        let (store, state) = fixture(Strategy::Hnsw);
        let expr = FilterExpr::has_id(vec![2, 3]);
        let results = search(&state, &store, Metric::Dot, &[1.0, 0.0], 3, Some(&expr), &NoAttrs, &NoIndex).unwrap();
        let ids: std::collections::HashSet<_> = results.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, std::collections::HashSet::from([2, 3]));
    }

    #[test]
    fn no_filter_returns_everything_within_k() {
        let (store, state) = fixture(Strategy::Ivf);
        let results = search(&state, &store, Metric::Dot, &[1.0, 0.0], 3, None, &NoAttrs, &NoIndex).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn ivf_preselected_candidates_still_honor_composed_predicate() {
        let (store, state) = fixture(Strategy::Ivf);
        // has_id composed with a leaf match on the same node: preselection
        // can only resolve the has_id half, so the leaf half must still be
        // checked per-candidate rather than trusting the preselected set.
        let mut expr = FilterExpr::has_id(vec![1, 2, 3]);
        expr.key = Some("color".to_string());
        expr.scope = Some(Scope::Meta);
        expr.match_value = Some(json!("red"));

        let results = search(&state, &store, Metric::Dot, &[1.0, 0.0], 3, Some(&expr), &NoAttrs, &NoIndex).unwrap();
        let ids: std::collections::HashSet<_> = results.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, std::collections::HashSet::from([1, 3]));
    }

    #[test]
    fn remove_then_search_excludes_id() {
        let (store, mut state) = fixture(Strategy::Hnsw);
        state.remove(store.index_of(1).unwrap(), 1);
        let results = search(&state, &store, Metric::Dot, &[1.0, 0.0], 3, None, &NoAttrs, &NoIndex).unwrap();
        assert!(!results.iter().any(|(id, _)| *id == 1));
    }
}
