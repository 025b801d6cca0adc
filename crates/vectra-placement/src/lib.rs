//! CRUSH-style placement: deterministic id→placement-group→target mapping,
//! the data segmenter that writes rows out along that mapping, and the
//! rebalance planner/applier that moves segments when the mapping changes.

pub mod crush;
pub mod error;
pub mod rebalance;
pub mod segmenter;

pub use crush::{hash_id, locate, pg_for, CrushConfig, PlacementDecision, Target};
pub use error::PlacementError;
pub use rebalance::{apply, plan, ApplyOptions, Move};
pub use segmenter::{parse_pg, segment_and_write, segment_target_key, RowPointer, SegmenterConfig};
