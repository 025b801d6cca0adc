use thiserror::Error;
use vectra_core::CoreError;

/// Error taxonomy for the storage layer: dense store mutation, binary
/// format decoding, the WAL, and the abstract blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("required state missing: {0}")]
    MissingState(String),

    #[error("segment missing: {0}")]
    MissingSegment(String),

    #[error("format error: {0}")]
    FormatError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn dim_mismatch(expected: usize, actual: usize) -> Self {
        StoreError::Core(CoreError::DimMismatch { expected, actual })
    }

    pub fn duplicate(id: u32) -> Self {
        StoreError::Core(CoreError::Duplicate(id))
    }
}
