//! Rebalance planner/applier: moves segments between targets when a CRUSH
//! config changes which target owns a placement group, without touching
//! the data those segments hold.

use std::collections::HashMap;
use std::sync::Arc;

use vectra_store::format::manifest::Manifest;
use vectra_store::BlobStore;

use crate::crush::CrushConfig;
use crate::error::PlacementError;
use crate::segmenter::segment_target_key;

#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub verify: bool,
    pub cleanup: bool,
}

/// Inspects every segment's encoded pg and computes its desired target
/// under `new_crush`, emitting a move for each segment whose target
/// changed.
pub fn plan(manifest: &Manifest, new_crush: &CrushConfig) -> Vec<Move> {
    manifest
        .segments
        .iter()
        .filter_map(|seg| {
            let desired = segment_target_key(&seg.name, new_crush)?;
            if desired != seg.target_key {
                Some(Move {
                    name: seg.name.clone(),
                    from: seg.target_key.clone(),
                    to: desired,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Executes `moves`: copies each segment's raw bytes from its source target
/// to its destination, verifies byte-length equality if requested, cleans
/// up the source if requested, and returns a manifest with the new target
/// mapping applied. `manifest` itself is left untouched; callers persist
/// the returned manifest as the new current one.
pub fn apply(
    manifest: &Manifest,
    moves: &[Move],
    targets: &HashMap<String, Arc<dyn BlobStore>>,
    options: ApplyOptions,
) -> Result<Manifest, PlacementError> {
    let mut updated = manifest.clone();

    for mv in moves {
        let from_store = targets
            .get(&mv.from)
            .ok_or_else(|| PlacementError::UnknownTarget(mv.from.clone()))?;
        let to_store = targets
            .get(&mv.to)
            .ok_or_else(|| PlacementError::UnknownTarget(mv.to.clone()))?;

        let bytes = from_store.read(&mv.name)?;
        to_store.atomic_write(&mv.name, &bytes)?;

        if options.verify {
            let roundtrip = to_store.read(&mv.name)?;
            if roundtrip.len() != bytes.len() {
                return Err(PlacementError::VerifyMismatch {
                    name: mv.name.clone(),
                    expected: bytes.len(),
                    actual: roundtrip.len(),
                });
            }
        }

        if options.cleanup {
            from_store.del(&mv.name)?;
        }

        tracing::info!(name = %mv.name, from = %mv.from, to = %mv.to, verified = options.verify, "rebalance move applied");

        if let Some(seg) = updated.segments.iter_mut().find(|s| s.name == mv.name) {
            seg.target_key = mv.to.clone();
        }
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crush::Target;
    use vectra_store::blobstore::memory::MemoryBlobStore;
    use vectra_store::format::manifest::ManifestSegment;

    fn targets_map(keys: &[&str]) -> HashMap<String, Arc<dyn BlobStore>> {
        keys.iter()
            .map(|k| (k.to_string(), Arc::new(MemoryBlobStore::new()) as Arc<dyn BlobStore>))
            .collect()
    }

    fn single_target_crush(key: &str) -> CrushConfig {
        CrushConfig::new(4, vec![Target::new(key)])
    }

    #[test]
    fn plan_emits_moves_when_target_changes() {
        let manifest = Manifest {
            base: "base".to_string(),
            segments: vec![ManifestSegment {
                name: "base.pg0.part0".to_string(),
                target_key: "old".to_string(),
            }],
            crush: None,
            epoch: 1,
            commit_ts: 1,
        };
        let new_crush = single_target_crush("new");
        let moves = plan(&manifest, &new_crush);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to, "new");
    }

    #[test]
    fn plan_is_empty_when_target_unchanged() {
        let manifest = Manifest {
            base: "base".to_string(),
            segments: vec![ManifestSegment {
                name: "base.pg0.part0".to_string(),
                target_key: "same".to_string(),
            }],
            crush: None,
            epoch: 1,
            commit_ts: 1,
        };
        let crush = single_target_crush("same");
        assert!(plan(&manifest, &crush).is_empty());
    }

    #[test]
    fn apply_copies_bytes_and_updates_manifest() {
        let targets = targets_map(&["old", "new"]);
        targets["old"].write("base.pg0.part0", b"hello").unwrap();

        let manifest = Manifest {
            base: "base".to_string(),
            segments: vec![ManifestSegment {
                name: "base.pg0.part0".to_string(),
                target_key: "old".to_string(),
            }],
            crush: None,
            epoch: 1,
            commit_ts: 1,
        };
        let moves = vec![Move {
            name: "base.pg0.part0".to_string(),
            from: "old".to_string(),
            to: "new".to_string(),
        }];
        let updated = apply(&manifest, &moves, &targets, ApplyOptions { verify: true, cleanup: true }).unwrap();
        assert_eq!(updated.segments[0].target_key, "new");
        assert_eq!(targets["new"].read("base.pg0.part0").unwrap(), b"hello");
        assert!(!targets["old"].exists("base.pg0.part0"));
    }

    #[test]
    fn apply_without_cleanup_leaves_source_intact() {
        let targets = targets_map(&["old", "new"]);
        targets["old"].write("base.pg0.part0", b"hello").unwrap();
        let manifest = Manifest {
            base: "base".to_string(),
            segments: vec![ManifestSegment {
                name: "base.pg0.part0".to_string(),
                target_key: "old".to_string(),
            }],
            crush: None,
            epoch: 1,
            commit_ts: 1,
        };
        let moves = vec![Move {
            name: "base.pg0.part0".to_string(),
            from: "old".to_string(),
            to: "new".to_string(),
        }];
        apply(&manifest, &moves, &targets, ApplyOptions { verify: false, cleanup: false }).unwrap();
        assert!(targets["old"].exists("base.pg0.part0"));
    }
}
