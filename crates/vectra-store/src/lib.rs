#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

//! Dense vector storage, binary persistence formats and the write-ahead
//! log. This crate knows nothing about any particular ANN strategy; it
//! owns the `(id, vector, meta)` tabular store, the on-disk wire formats,
//! and the abstract blob store collaborator those formats are read from
//! and written to.

pub mod blobstore;
pub mod codec;
pub mod core_store;
pub mod error;
pub mod format;
pub mod wal;

pub use blobstore::BlobStore;
pub use core_store::{CoreStore, InsertOutcome, Meta, RemoveOutcome};
pub use error::StoreError;
