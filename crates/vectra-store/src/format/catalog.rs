//! Catalog: `<base>.catalog.json`. Written once per save and read first on
//! open/rebuild to reconstruct a fresh store of the right shape before any
//! segment is touched.

use serde::{Deserialize, Serialize};
use vectra_core::{Metric, Strategy};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub version: u32,
    pub dim: u32,
    #[serde(rename = "metricCode")]
    pub metric_code: u8,
    #[serde(rename = "strategyCode")]
    pub strategy_code: u8,
}

impl Catalog {
    pub fn new(dim: u32, metric: Metric, strategy: Strategy) -> Self {
        Self {
            version: 1,
            dim,
            metric_code: metric.code(),
            strategy_code: strategy.code(),
        }
    }

    pub fn metric(&self) -> Result<Metric, StoreError> {
        Metric::from_code(self.metric_code)
            .ok_or_else(|| StoreError::FormatError(format!("unknown metric code {}", self.metric_code)))
    }

    pub fn strategy(&self) -> Result<Strategy, StoreError> {
        Strategy::from_code(self.strategy_code).ok_or_else(|| {
            StoreError::FormatError(format!("unknown strategy code {}", self.strategy_code))
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
