//! Data segmenter: groups rows by placement group and writes one or more
//! segment parts per group, rotating when a part grows past a configured
//! byte budget.

use std::collections::HashMap;
use std::sync::Arc;

use vectra_core::VectorId;
use vectra_store::format::data_segment;
use vectra_store::format::manifest::{Manifest, ManifestSegment};
use vectra_store::BlobStore;

use crate::crush::{locate, pg_for, CrushConfig};
use crate::error::PlacementError;

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub base: String,
    /// Whether parts rotate at all. When `false`, every pg writes a single
    /// `part0`, growing unbounded.
    pub segmented: bool,
    pub segment_bytes: usize,
    pub epoch: u64,
    pub commit_ts: i64,
}

/// Where a single id's row physically landed.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPointer {
    pub id: VectorId,
    pub segment: String,
    pub offset: u32,
    pub length: u32,
}

fn row_encoded_size(meta: &Option<Vec<u8>>, vector: &[f32]) -> usize {
    4 + 4 + meta.as_ref().map_or(0, Vec::len) + 4 + vector.len() * 4
}

fn flush_part(
    base: &str,
    pg: u32,
    part: u32,
    rows: &[(VectorId, Option<Vec<u8>>, Vec<f32>)],
    store: &Arc<dyn BlobStore>,
    pointers: &mut Vec<RowPointer>,
    segment_names: &mut Vec<String>,
) -> Result<(), PlacementError> {
    if rows.is_empty() {
        return Ok(());
    }
    let name = format!("{base}.pg{pg}.part{part}");
    let bytes = data_segment::encode(rows).expect("encoding into a Vec never fails");
    store.atomic_write(&name, &bytes)?;

    for row in data_segment::decode(&bytes)? {
        pointers.push(RowPointer {
            id: row.id,
            segment: name.clone(),
            offset: row.offset,
            length: row.length,
        });
    }
    segment_names.push(name);
    Ok(())
}

/// Segments `rows` by pg, writes every resulting part atomically to its
/// resolved target store, and returns the per-id pointers plus a manifest
/// naming every segment written (not only the final, still-open part of
/// each pg — rebalance and open both need every part that exists on disk).
pub fn segment_and_write(
    rows: &[(VectorId, Option<Vec<u8>>, Vec<f32>)],
    crush: &CrushConfig,
    config: &SegmenterConfig,
    targets: &HashMap<String, Arc<dyn BlobStore>>,
) -> Result<(Vec<RowPointer>, Manifest), PlacementError> {
    let mut by_pg: HashMap<u32, Vec<(VectorId, Option<Vec<u8>>, Vec<f32>)>> = HashMap::new();
    for row in rows {
        by_pg.entry(pg_for(row.0, crush)).or_default().push(row.clone());
    }

    let mut pointers = Vec::new();
    let mut segment_names = Vec::new();

    let mut pgs: Vec<u32> = by_pg.keys().copied().collect();
    pgs.sort_unstable();

    for pg in pgs {
        let group = &by_pg[&pg];
        let decision = locate(group[0].0, crush)?;
        let target_key = decision.primaries[0].clone();
        let store = targets
            .get(&target_key)
            .ok_or_else(|| PlacementError::UnknownTarget(target_key.clone()))?;

        let mut part = 0u32;
        let mut current: Vec<(VectorId, Option<Vec<u8>>, Vec<f32>)> = Vec::new();
        let mut current_bytes = 8usize; // VLDT header

        for (id, meta, vector) in group {
            let incoming = row_encoded_size(meta, vector);
            if config.segmented && !current.is_empty() && current_bytes + incoming > config.segment_bytes {
                flush_part(&config.base, pg, part, &current, store, &mut pointers, &mut segment_names)?;
                current.clear();
                current_bytes = 8;
                part += 1;
            }
            current_bytes += incoming;
            current.push((*id, meta.clone(), vector.clone()));
        }
        flush_part(&config.base, pg, part, &current, store, &mut pointers, &mut segment_names)?;
    }

    let manifest_segments = segment_names
        .into_iter()
        .map(|name| {
            let target_key = segment_target_key(&name, crush).unwrap_or_default();
            ManifestSegment { name, target_key }
        })
        .collect();

    let manifest = Manifest {
        base: config.base.clone(),
        segments: manifest_segments,
        crush: Some(crush.to_json()),
        epoch: config.epoch,
        commit_ts: config.commit_ts,
    };

    Ok((pointers, manifest))
}

/// Parses the pg encoded in a segment name (`<base>.pg<N>.part<M>`) and
/// resolves its current target under `crush`, using the same deterministic
/// function `locate` applies so this never needs to re-derive an id.
pub fn segment_target_key(name: &str, crush: &CrushConfig) -> Option<String> {
    let pg = parse_pg(name)?;
    let idx = (u64::from(pg).wrapping_mul(2_654_435_761) % crush.targets.len().max(1) as u64) as usize;
    crush.targets.get(idx).map(|t| t.key.clone())
}

/// Extracts the placement-group number from a segment name of the form
/// `<base>.pg<N>.part<M>`.
pub fn parse_pg(name: &str) -> Option<u32> {
    let pg_part = name.split('.').find(|s| s.starts_with("pg"))?;
    pg_part[2..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crush::Target;
    use vectra_store::blobstore::memory::MemoryBlobStore;

    fn fixture() -> (CrushConfig, HashMap<String, Arc<dyn BlobStore>>) {
        let crush = CrushConfig::new(4, vec![Target::new("a"), Target::new("b")]);
        let mut targets: HashMap<String, Arc<dyn BlobStore>> = HashMap::new();
        targets.insert("a".to_string(), Arc::new(MemoryBlobStore::new()));
        targets.insert("b".to_string(), Arc::new(MemoryBlobStore::new()));
        (crush, targets)
    }

    fn rows(n: u32) -> Vec<(VectorId, Option<Vec<u8>>, Vec<f32>)> {
        (1..=n).map(|id| (id, None, vec![id as f32, 0.0])).collect()
    }

    #[test]
    fn every_row_gets_a_pointer() {
        let (crush, targets) = fixture();
        let config = SegmenterConfig {
            base: "base".to_string(),
            segmented: false,
            segment_bytes: 1 << 20,
            epoch: 1,
            commit_ts: 100,
        };
        let (pointers, manifest) = segment_and_write(&rows(20), &crush, &config, &targets).unwrap();
        assert_eq!(pointers.len(), 20);
        assert!(!manifest.segments.is_empty());
    }

    #[test]
    fn parse_pg_extracts_number() {
        assert_eq!(parse_pg("base.pg3.part0"), Some(3));
        assert_eq!(parse_pg("nonsense"), None);
    }

    #[test]
    fn rotation_produces_multiple_parts_when_bytes_exceeded() {
        let (crush, targets) = fixture();
        let config = SegmenterConfig {
            base: "base".to_string(),
            segmented: true,
            segment_bytes: 40,
            epoch: 1,
            commit_ts: 100,
        };
        let (pointers, manifest) = segment_and_write(&rows(20), &crush, &config, &targets).unwrap();
        assert_eq!(pointers.len(), 20);
        let part_names: std::collections::HashSet<_> =
            manifest.segments.iter().map(|s| s.name.clone()).collect();
        assert!(part_names.len() > 4); // more parts than pgs since rotation kicked in
    }

    #[test]
    fn manifest_maps_every_segment_to_a_target() {
        let (crush, targets) = fixture();
        let config = SegmenterConfig {
            base: "base".to_string(),
            segmented: false,
            segment_bytes: 1 << 20,
            epoch: 1,
            commit_ts: 100,
        };
        let (_, manifest) = segment_and_write(&rows(10), &crush, &config, &targets).unwrap();
        for seg in &manifest.segments {
            assert!(targets.contains_key(&seg.target_key));
        }
    }
}
