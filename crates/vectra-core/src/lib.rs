//! Shared primitives for the `vectra` embeddable vector database.
//!
//! This crate has no knowledge of storage or persistence; it only provides
//! the vocabulary every other crate in the workspace builds on: the
//! similarity metric and its scoring kernels, the error taxonomy, the
//! injectable clock, the deterministic PRNG used for HNSW level sampling and
//! IVF k-means seeding, and the strategy discriminant.

pub mod clock;
pub mod error;
pub mod metric;
pub mod rng;
pub mod strategy;

pub use clock::{Clock, FixedClock, OffsetClock, SystemClock};
pub use error::CoreError;
pub use metric::Metric;
pub use rng::Xorshift32;
pub use strategy::Strategy;

/// Vector element type used throughout the store. `f32` matches the SoA
/// layout used across the ANN strategies and keeps the hot scoring loops
/// cache-friendly.
pub type Float = f32;

/// A 32-bit user-facing identifier for a stored vector.
pub type VectorId = u32;
