use thiserror::Error;
use vectra_core::CoreError;
use vectra_store::StoreError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("format error: {0}")]
    FormatError(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
