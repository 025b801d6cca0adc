//! Maintenance: point-in-time stats, advisory diagnostics, and the
//! non-destructive operations that keep an ANN strategy healthy over time
//! (HNSW compaction, IVF retraining, HNSW parameter tuning).

use vectra_core::{Metric, Strategy};
use vectra_index::hnsw::compact_rebuild;
use vectra_index::{bruteforce, HnswParams, HnswState, IvfParams, IvfState, StrategyState};
use vectra_store::CoreStore;

pub use crate::manager::rebuild_ann_from_store;
use crate::error::ManagerError;

#[derive(Debug, Clone, Default)]
pub struct HnswStats {
    pub max_level: i32,
    pub avg_degree: f64,
    pub tombstone_ratio: f64,
}

#[derive(Debug, Clone, Default)]
pub struct IvfStats {
    pub centroid_count: usize,
    pub list_lens: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub count: usize,
    pub dim: usize,
    pub metric: Metric,
    pub strategy: Strategy,
    pub hnsw: Option<HnswStats>,
    pub ivf: Option<IvfStats>,
}

pub fn stats(store: &CoreStore, state: &StrategyState) -> Stats {
    let (hnsw, ivf) = match state {
        StrategyState::Bruteforce => (None, None),
        StrategyState::Hnsw(h) => (
            Some(HnswStats {
                max_level: h.max_level(),
                avg_degree: h.layer0_avg_degree(store.count()),
                tombstone_ratio: h.tombstone_ratio(store.count()),
            }),
            None,
        ),
        StrategyState::Ivf(i) => (
            None,
            Some(IvfStats {
                centroid_count: i.centroid_count(),
                list_lens: i.list_lens(),
            }),
        ),
    };
    Stats {
        count: store.count(),
        dim: store.dim,
        metric: store.metric,
        strategy: state.strategy(),
        hnsw,
        ivf,
    }
}

/// Advisory suggestions derived from [`stats`]; purely informational, never
/// applied automatically.
pub fn diagnose(store: &CoreStore, state: &StrategyState) -> Vec<String> {
    let s = stats(store, state);
    let mut notes = Vec::new();

    if s.strategy == Strategy::Bruteforce && s.count > 50_000 {
        notes.push(format!(
            "{} vectors under brute-force; consider HNSW or IVF for lower query latency",
            s.count
        ));
    }

    if let Some(h) = &s.hnsw {
        if h.tombstone_ratio > 0.2 {
            notes.push(format!(
                "HNSW tombstone ratio {:.0}% exceeds 20%; run compact_rebuild to reclaim space",
                h.tombstone_ratio * 100.0
            ));
        }
        if s.count > 100 && h.avg_degree < 2.0 {
            notes.push(format!(
                "HNSW layer-0 average degree {:.1} is low for {} vectors; graph may be under-connected",
                h.avg_degree, s.count
            ));
        }
    }

    if let Some(ivf) = &s.ivf {
        if let (Some(&min), Some(&max)) = (ivf.list_lens.iter().min(), ivf.list_lens.iter().max()) {
            if max > min.max(1) * 4 {
                notes.push(format!(
                    "IVF posting lists are imbalanced (min {min}, max {max}); consider retrain_ivf"
                ));
            }
        }
    }

    notes
}

/// Rebuilds a fresh store + HNSW graph dropping tombstoned rows. Row
/// indices change; callers must treat the returned pair as a full
/// replacement, not an in-place update.
pub fn compact_hnsw(store: &CoreStore, hnsw: &HnswState, metric: Metric) -> (CoreStore, HnswState, usize) {
    compact_rebuild(store, hnsw, metric)
}

/// Retrains IVF centroids from the current store contents and reassigns
/// every row to its nearest centroid.
pub fn retrain_ivf(ivf: &mut IvfState, store: &CoreStore, metric: Metric, seed: u32, iterations: usize) {
    ivf.train(store, metric, seed, iterations);
}

/// Estimated recall and mean query latency of `state` against brute-force
/// ground truth over `queries`, each scored for top-`k`.
pub fn estimate_recall(
    store: &CoreStore,
    state: &StrategyState,
    metric: Metric,
    queries: &[Vec<f32>],
    k: usize,
) -> Result<(f64, f64), ManagerError> {
    match state {
        StrategyState::Ivf(ivf) => Ok(ivf.evaluate(store, metric, queries, k)),
        _ => {
            let mut hits = 0usize;
            let mut total = 0usize;
            let started = std::time::Instant::now();
            for query in queries {
                let truth: std::collections::HashSet<_> = bruteforce::search(store, metric, query, k, None)?
                    .into_iter()
                    .map(|c| store.id_at(c.row))
                    .collect();
                let got = vectra_index::strategy::search(state, store, metric, query, k, None, &vectra_index::filter::NoAttrs, &NoIndexReader)?;
                hits += got.iter().filter(|(id, _)| truth.contains(id)).count();
                total += truth.len().max(1);
            }
            let recall = if total == 0 { 1.0 } else { hits as f64 / total as f64 };
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0 / queries.len().max(1) as f64;
            Ok((recall, latency_ms))
        }
    }
}

struct NoIndexReader;
impl vectra_index::filter::AttributeIndexReader for NoIndexReader {
    fn eq(&self, _key: &str, _value: &serde_json::Value) -> Option<roaring::RoaringBitmap> {
        None
    }
    fn exists(&self, _key: &str) -> Option<roaring::RoaringBitmap> {
        None
    }
    fn range(&self, _key: &str, _range: vectra_index::filter::RangeBounds) -> Option<roaring::RoaringBitmap> {
        None
    }
}

/// One candidate in an HNSW parameter sweep and its measured recall/latency.
#[derive(Debug, Clone)]
pub struct TuningResult {
    pub params: HnswParams,
    pub recall: f64,
    pub latency_ms: f64,
}

/// Builds an ephemeral HNSW graph for each candidate parameter set, scores
/// recall/latency against brute-force over `queries`, and returns every
/// result ordered best-recall-first. Never mutates the caller's live
/// strategy state.
pub fn tune_hnsw(
    store: &CoreStore,
    metric: Metric,
    candidates: &[HnswParams],
    queries: &[Vec<f32>],
    k: usize,
) -> Result<Vec<TuningResult>, ManagerError> {
    let mut results = Vec::with_capacity(candidates.len());
    for &params in candidates {
        let mut hnsw = HnswState::new(params, store.count().max(1));
        for row in 0..store.count() {
            hnsw.insert(row, store, metric);
        }
        let state = StrategyState::Hnsw(hnsw);
        let (recall, latency_ms) = estimate_recall(store, &state, metric, queries, k)?;
        results.push(TuningResult { params, recall, latency_ms });
    }
    results.sort_by(|a, b| b.recall.partial_cmp(&a.recall).unwrap_or(std::cmp::Ordering::Equal));
    Ok(results)
}
