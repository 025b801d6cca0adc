//! Brute-force strategy: no auxiliary state, a linear scan over every live
//! row in the store.

use vectra_core::metric::check_dim;
use vectra_core::{Metric, VectorId};
use vectra_store::CoreStore;

use crate::error::IndexError;
use crate::topk::{Candidate, TopK};

/// Scans rows `0..count`, scoring each against `query` and maintaining a
/// top-K. `allowed` restricts scoring to a specific row subset (hard-mode
/// filtering or preselection); `None` scans everything.
pub fn search(
    store: &CoreStore,
    metric: Metric,
    query: &[f32],
    k: usize,
    allowed_rows: Option<&[usize]>,
) -> Result<Vec<Candidate>, IndexError> {
    check_dim(query, store.dim)?;
    let mut top = TopK::new(k);

    match allowed_rows {
        Some(rows) => {
            for &row in rows {
                if row >= store.count() {
                    continue;
                }
                let score = metric.score(query, store.vector_at(row));
                top.push(Candidate { row, score });
            }
        }
        None => {
            for row in 0..store.count() {
                let score = metric.score(query, store.vector_at(row));
                top.push(Candidate { row, score });
            }
        }
    }

    Ok(top.into_sorted())
}

/// Maps [`Candidate`] rows back to user-facing ids, pairing each with its
/// score.
pub fn resolve_ids(store: &CoreStore, candidates: &[Candidate]) -> Vec<(VectorId, f32)> {
    candidates
        .iter()
        .map(|c| (store.id_at(c.row), c.score))
        .collect()
}
