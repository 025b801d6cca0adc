//! HEAD pointer: `<base>.head.json`, the currently-published manifest
//! reference with its commit timestamp. The only authoritative pointer
//! used for bounded-staleness reads; always written after the index file
//! it refers to is durable.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Head {
    pub manifest: String,
    pub epoch: u64,
    #[serde(rename = "commitTs")]
    pub commit_ts: i64,
}

impl Head {
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Bounded-staleness readability predicate: `readTs ≥ commitTs`.
    pub fn is_readable_at(&self, read_ts: i64) -> bool {
        read_ts >= self.commit_ts
    }
}
