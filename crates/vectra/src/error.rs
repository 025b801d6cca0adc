use thiserror::Error;
use vectra_index::IndexError;
use vectra_placement::PlacementError;
use vectra_store::StoreError;

/// Errors raised by the indexing manager's save/open/rebuild orchestration.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("missing state: {0}")]
    MissingState(String),

    #[error("missing segment: {0}")]
    MissingSegment(String),

    #[error("format error: {0}")]
    FormatError(String),
}

/// Top-level error surface of the client facade, covering the whole stack.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("vector {0} not found")]
    NotFound(u32),
}
