use thiserror::Error;

/// Errors shared across the workspace at the vector/metric boundary.
///
/// Storage, index and placement crates each define their own error enum for
/// concerns specific to them and compose this one in via `#[from]`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimMismatch { expected: usize, actual: usize },

    #[error("id {0} already exists")]
    Duplicate(u32),

    #[error("id {0} not found")]
    NotFound(u32),
}
