use thiserror::Error;
use vectra_store::StoreError;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no placement targets configured")]
    NoTargets,

    #[error("unknown target key: {0}")]
    UnknownTarget(String),

    #[error("segment name does not encode a placement group: {0}")]
    UnparseablePg(String),

    #[error("verify failed for segment {name}: expected {expected} bytes, found {actual}")]
    VerifyMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
