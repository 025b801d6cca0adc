//! Embeddable vector database facade: coordination (clock-driven commit
//! timestamps, commit-wait, the single-writer lock, named leases), the
//! indexing manager that persists and reconstructs `(CoreStore,
//! StrategyState)` pairs, maintenance diagnostics/compaction/tuning,
//! autosave scheduling, and the [`Client`] facade embedders drive day to
//! day.
//!
//! The dense storage and wire formats live in `vectra-store`; the ANN
//! strategies and filter engine live in `vectra-index`; CRUSH placement,
//! segmenting and rebalancing live in `vectra-placement`. This crate wires
//! all three together behind the coordination primitives a multi-writer,
//! bounded-staleness deployment needs.

pub mod autosave;
pub mod client;
pub mod coordination;
pub mod error;
pub mod maintenance;
pub mod manager;

pub use autosave::{AutosaveDriver, AutosavePolicy, AutosaveTracker};
pub use client::{Client, ClientConfig};
pub use coordination::{commit_wait, compute_commit_ts, FixedClock, Lease, LeaseProvider, OffsetClock, SystemClock, WriterLock};
pub use error::{ClientError, ManagerError};
pub use maintenance::{compact_hnsw, diagnose, estimate_recall, retrain_ivf, stats, tune_hnsw, HnswStats, IvfStats, Stats, TuningResult};
pub use manager::{rebuild_ann_from_store, IndexingManager, OpenOptions, SaveOptions, SaveOutcome};

use vectra_core::{Metric, Strategy};
use vectra_index::{HnswParams, IvfParams};

/// Per-strategy construction parameters, named by the strategy they apply
/// to so a caller can't pass HNSW params while asking for IVF.
#[derive(Debug, Clone, Copy)]
pub enum StrategyParams {
    Bruteforce,
    Hnsw(HnswParams),
    Ivf(IvfParams),
}

impl StrategyParams {
    pub fn strategy(&self) -> Strategy {
        match self {
            StrategyParams::Bruteforce => Strategy::Bruteforce,
            StrategyParams::Hnsw(_) => Strategy::Hnsw,
            StrategyParams::Ivf(_) => Strategy::Ivf,
        }
    }

    pub fn hnsw_params(&self) -> HnswParams {
        match self {
            StrategyParams::Hnsw(p) => *p,
            _ => HnswParams::default(),
        }
    }

    pub fn ivf_params(&self) -> IvfParams {
        match self {
            StrategyParams::Ivf(p) => *p,
            _ => IvfParams::default(),
        }
    }
}

/// Top-level shape of a vectra instance: fixed dimension, similarity
/// metric, and which ANN strategy (with its parameters) backs it.
#[derive(Debug, Clone, Copy)]
pub struct VectraConfig {
    pub dim: usize,
    pub metric: Metric,
    pub strategy_params: StrategyParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_params_report_matching_strategy() {
        assert_eq!(StrategyParams::Bruteforce.strategy(), Strategy::Bruteforce);
        assert_eq!(StrategyParams::Hnsw(HnswParams::default()).strategy(), Strategy::Hnsw);
        assert_eq!(StrategyParams::Ivf(IvfParams::default()).strategy(), Strategy::Ivf);
    }

    #[test]
    fn non_matching_params_fall_back_to_defaults() {
        let bruteforce = StrategyParams::Bruteforce;
        assert_eq!(bruteforce.hnsw_params(), HnswParams::default());
        assert_eq!(bruteforce.ivf_params(), IvfParams::default());
    }
}
