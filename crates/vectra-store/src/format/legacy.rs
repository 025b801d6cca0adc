//! Legacy single-file snapshot format (`VLIT`, versions 1-2). Predates the
//! separated index+data layout; kept for reading old snapshots, not
//! produced by current saves. Its metric codec is restricted to
//! `{cosine, l2}` — `dot` was added only in the `VLIX` index file format —
//! so decoding a `VLIT` snapshot with `metric=dot` is rejected.

use vectra_core::Metric;

use crate::codec::{
    check_magic, read_block, read_f32_vec, read_u32, write_block, write_f32_slice, write_u32,
};
use crate::error::StoreError;

const MAGIC: u32 = 0x564c_4954; // "VLIT"
const VERSION_1: u32 = 1;
const VERSION_2: u32 = 2;

#[derive(Debug, Clone)]
pub struct LegacyRow {
    pub id: u32,
    pub meta: Option<Vec<u8>>,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct LegacySnapshot {
    pub version: u32,
    pub metric: Metric,
    pub dim: u32,
    pub rows: Vec<LegacyRow>,
}

fn check_legacy_metric(metric: Metric) -> Result<(), StoreError> {
    if matches!(metric, Metric::Dot) {
        return Err(StoreError::FormatError(
            "VLIT legacy snapshot does not support metric=dot".to_string(),
        ));
    }
    Ok(())
}

impl LegacySnapshot {
    /// Always encodes as the current version (2).
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        check_legacy_metric(self.metric)?;
        let mut out = Vec::new();
        write_u32(&mut out, MAGIC)?;
        write_u32(&mut out, VERSION_2)?;
        write_u32(&mut out, self.metric.code() as u32)?;
        write_u32(&mut out, self.dim)?;
        write_u32(&mut out, self.rows.len() as u32)?;
        for row in &self.rows {
            write_u32(&mut out, row.id)?;
            write_block(&mut out, &row.meta.clone().unwrap_or_default())?;
            write_f32_slice(&mut out, &row.vector)?;
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut r = bytes;
        let magic = read_u32(&mut r)?;
        check_magic(magic, MAGIC, "legacy snapshot")?;
        let version = read_u32(&mut r)?;
        if version != VERSION_1 && version != VERSION_2 {
            return Err(StoreError::FormatError(format!(
                "legacy snapshot: unsupported version {version}"
            )));
        }
        let metric_code = read_u32(&mut r)? as u8;
        let metric = Metric::from_code(metric_code)
            .ok_or_else(|| StoreError::FormatError(format!("unknown metric code {metric_code}")))?;
        check_legacy_metric(metric)?;
        let dim = read_u32(&mut r)?;
        let count = read_u32(&mut r)?;

        let mut rows = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = read_u32(&mut r)?;
            let meta_bytes = read_block(&mut r)?;
            let vector = read_f32_vec(&mut r, dim as usize)?;
            let meta = if meta_bytes.is_empty() {
                None
            } else {
                Some(meta_bytes)
            };
            rows.push(LegacyRow { id, meta, vector });
        }

        Ok(LegacySnapshot {
            version,
            metric,
            dim,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_cosine() {
        let snap = LegacySnapshot {
            version: 2,
            metric: Metric::Cosine,
            dim: 2,
            rows: vec![LegacyRow {
                id: 1,
                meta: Some(b"x".to_vec()),
                vector: vec![1.0, 0.0],
            }],
        };
        let bytes = snap.encode().unwrap();
        let decoded = LegacySnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded.rows[0].id, 1);
        assert_eq!(decoded.metric, Metric::Cosine);
    }

    #[test]
    fn dot_metric_is_rejected() {
        let snap = LegacySnapshot {
            version: 2,
            metric: Metric::Dot,
            dim: 2,
            rows: vec![],
        };
        assert!(snap.encode().is_err());
    }

    #[test]
    fn decoding_dot_metric_code_is_rejected() {
        // Hand-build bytes claiming metric=dot (code 2) to exercise the
        // decode-side guard independently of the encode-side guard.
        let mut out = Vec::new();
        write_u32(&mut out, MAGIC).unwrap();
        write_u32(&mut out, VERSION_2).unwrap();
        write_u32(&mut out, Metric::Dot.code() as u32).unwrap();
        write_u32(&mut out, 2).unwrap();
        write_u32(&mut out, 0).unwrap();
        assert!(LegacySnapshot::decode(&out).is_err());
    }

    #[test]
    fn version_1_is_accepted() {
        let mut out = Vec::new();
        write_u32(&mut out, MAGIC).unwrap();
        write_u32(&mut out, VERSION_1).unwrap();
        write_u32(&mut out, Metric::L2.code() as u32).unwrap();
        write_u32(&mut out, 1).unwrap();
        write_u32(&mut out, 0).unwrap();
        let decoded = LegacySnapshot::decode(&out).unwrap();
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.rows.len(), 0);
    }
}
