//! Placement manifest: `<base>.manifest.json`, mapping each data segment
//! to the target store key it currently lives in. Written after the
//! catalog and before HEAD on every save; replaced wholesale each time.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestSegment {
    pub name: String,
    #[serde(rename = "targetKey")]
    pub target_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub base: String,
    pub segments: Vec<ManifestSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crush: Option<serde_json::Value>,
    pub epoch: u64,
    #[serde(rename = "commitTs")]
    pub commit_ts: i64,
}

impl Manifest {
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn target_for(&self, segment_name: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|s| s.name == segment_name)
            .map(|s| s.target_key.as_str())
    }
}
