//! Index file format (`VLIX`, v1): the catalog-adjacent header plus the
//! entry pointers that map ids to byte ranges inside data segments, and an
//! optional embedded serialized ANN payload.

use vectra_core::{Metric, Strategy};

use crate::codec::{
    check_magic, check_version, read_block, read_u32, write_block, write_u32,
};
use crate::error::StoreError;

const MAGIC: u32 = u32::from_le_bytes(*b"VLIX");
const VERSION: u32 = 1;
const FLAG_HAS_ANN: u32 = 1;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: u32,
    pub segment_name: String,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone)]
pub struct IndexFile {
    pub metric: Metric,
    pub dim: u32,
    pub count: u32,
    pub strategy: Strategy,
    pub ann_bytes: Option<Vec<u8>>,
    pub entries: Vec<IndexEntry>,
}

impl IndexFile {
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        write_u32(&mut out, MAGIC)?;
        write_u32(&mut out, VERSION)?;
        write_u32(&mut out, 0)?; // reserved
        write_u32(&mut out, 0)?; // reserved, completes the 16-byte header

        write_u32(&mut out, self.metric.code() as u32)?;
        write_u32(&mut out, self.dim)?;
        write_u32(&mut out, self.count)?;
        write_u32(&mut out, self.strategy.code() as u32)?;
        let flags = if self.ann_bytes.is_some() {
            FLAG_HAS_ANN
        } else {
            0
        };
        write_u32(&mut out, flags)?;

        if let Some(ann) = &self.ann_bytes {
            write_block(&mut out, ann)?;
        }

        for entry in &self.entries {
            write_u32(&mut out, entry.id)?;
            write_block(&mut out, entry.segment_name.as_bytes())?;
            write_u32(&mut out, entry.offset)?;
            write_u32(&mut out, entry.length)?;
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut r = bytes;
        let magic = read_u32(&mut r)?;
        check_magic(magic, MAGIC, "index file")?;
        let version = read_u32(&mut r)?;
        check_version(version, VERSION, "index file")?;
        let _reserved1 = read_u32(&mut r)?;
        let _reserved2 = read_u32(&mut r)?;

        let metric_code = read_u32(&mut r)? as u8;
        let metric = Metric::from_code(metric_code)
            .ok_or_else(|| StoreError::FormatError(format!("unknown metric code {metric_code}")))?;
        let dim = read_u32(&mut r)?;
        let count = read_u32(&mut r)?;
        let strategy_code = read_u32(&mut r)? as u8;
        let strategy = Strategy::from_code(strategy_code).ok_or_else(|| {
            StoreError::FormatError(format!("unknown strategy code {strategy_code}"))
        })?;
        let flags = read_u32(&mut r)?;

        let ann_bytes = if flags & FLAG_HAS_ANN != 0 {
            Some(read_block(&mut r)?)
        } else {
            None
        };

        let mut entries = Vec::new();
        while !r.is_empty() {
            let id = read_u32(&mut r)?;
            let name_bytes = read_block(&mut r)?;
            let segment_name = String::from_utf8(name_bytes)
                .map_err(|e| StoreError::FormatError(format!("non-utf8 segment name: {e}")))?;
            let offset = read_u32(&mut r)?;
            let length = read_u32(&mut r)?;
            entries.push(IndexEntry {
                id,
                segment_name,
                offset,
                length,
            });
        }

        Ok(IndexFile {
            metric,
            dim,
            count,
            strategy,
            ann_bytes,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexFile {
        IndexFile {
            metric: Metric::Cosine,
            dim: 3,
            count: 2,
            strategy: Strategy::Bruteforce,
            ann_bytes: None,
            entries: vec![
                IndexEntry {
                    id: 1,
                    segment_name: "base.pg0.part0".to_string(),
                    offset: 8,
                    length: 20,
                },
                IndexEntry {
                    id: 2,
                    segment_name: "base.pg0.part0".to_string(),
                    offset: 28,
                    length: 20,
                },
            ],
        }
    }

    #[test]
    fn roundtrip_without_ann() {
        let f = sample();
        let bytes = f.encode().unwrap();
        let decoded = IndexFile::decode(&bytes).unwrap();
        assert_eq!(decoded.metric, Metric::Cosine);
        assert_eq!(decoded.strategy, Strategy::Bruteforce);
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.entries[1].segment_name, "base.pg0.part0");
        assert!(decoded.ann_bytes.is_none());
    }

    #[test]
    fn roundtrip_with_ann_payload() {
        let mut f = sample();
        f.ann_bytes = Some(vec![1, 2, 3, 4]);
        f.strategy = Strategy::Hnsw;
        let bytes = f.encode().unwrap();
        let decoded = IndexFile::decode(&bytes).unwrap();
        assert_eq!(decoded.ann_bytes, Some(vec![1, 2, 3, 4]));
        assert_eq!(decoded.strategy, Strategy::Hnsw);
    }

    #[test]
    fn unknown_metric_code_errors() {
        let f = sample();
        let mut bytes = f.encode().unwrap();
        bytes[16] = 99; // metricCode byte right after the 16-byte header
        assert!(IndexFile::decode(&bytes).is_err());
    }
}
