//! ANN strategies (bruteforce, HNSW, IVF), the bounded top-K collector they
//! all share, and the filter expression engine that combines with each of
//! them at query time.
//!
//! This crate knows how to score and rank rows already held by a
//! [`vectra_store::CoreStore`]; it has no opinion on persistence layout or
//! coordination, which live in `vectra-store` and the top-level `vectra`
//! crate respectively.

pub mod bruteforce;
pub mod codec_ext;
pub mod error;
pub mod filter;
pub mod hnsw;
pub mod ivf;
pub mod strategy;
pub mod topk;

pub use error::IndexError;
pub use filter::{AttrsAccessor, AttributeIndexReader, FilterExpr, HasId, RangeBounds, Scope};
pub use hnsw::{HnswParams, HnswState};
pub use ivf::{IvfParams, IvfState};
pub use strategy::StrategyState;
pub use topk::{Candidate, TopK};
