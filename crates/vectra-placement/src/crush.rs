//! CRUSH-style placement: a deterministic `id -> placement group -> target`
//! mapping. Weight and zone are accepted on [`Target`] for forward
//! compatibility with richer placement policies, but this core only
//! implements single-replica, equal-weight placement.

use serde::{Deserialize, Serialize};

use crate::error::PlacementError;

/// A storage target a segment can be written to, identified by the key its
/// `vectra_store::BlobStore` is registered under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub key: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Target {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            weight: 1.0,
            zone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrushConfig {
    pub pgs: u32,
    pub targets: Vec<Target>,
}

impl CrushConfig {
    pub fn new(pgs: u32, targets: Vec<Target>) -> Self {
        Self { pgs: pgs.max(1), targets }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("CrushConfig always serializes")
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, PlacementError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementDecision {
    pub pg: u32,
    pub primaries: Vec<String>,
}

/// Deterministic, platform-stable hash of an id's little-endian bytes.
/// `DefaultHasher`'s algorithm is unspecified and may change across Rust
/// versions, which would silently reshuffle every existing placement.
pub fn hash_id(id: u32) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in id.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// `pg = hash(id) mod crush.pgs`.
pub fn pg_for(id: u32, crush: &CrushConfig) -> u32 {
    (hash_id(id) % u64::from(crush.pgs)) as u32
}

/// Deterministic per-pg target selection: `idx = (pg * 2654435761) mod |targets|`.
pub fn locate(id: u32, crush: &CrushConfig) -> Result<PlacementDecision, PlacementError> {
    if crush.targets.is_empty() {
        return Err(PlacementError::NoTargets);
    }
    let pg = pg_for(id, crush);
    let idx = (u64::from(pg).wrapping_mul(2_654_435_761) % crush.targets.len() as u64) as usize;
    Ok(PlacementDecision {
        pg,
        primaries: vec![crush.targets[idx].key.clone()],
    })
}
