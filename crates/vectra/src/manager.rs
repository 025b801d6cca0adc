//! Indexing manager: the orchestration that turns a live `(CoreStore,
//! StrategyState)` pair into the on-disk catalog/manifest/index-file/HEAD
//! quartet on save, and reconstructs the pair from disk on open, falling
//! back to a full data rebuild when the index file is absent or stale.

use std::collections::HashMap;
use std::sync::Arc;

use vectra_core::clock::{Clock, Millis};
use vectra_core::{Metric, Strategy, VectorId};
use vectra_index::{HnswParams, HnswState, IvfParams, IvfState, StrategyState};
use vectra_placement::{segment_and_write, CrushConfig, SegmenterConfig};
use vectra_store::format::catalog::Catalog;
use vectra_store::format::data_segment;
use vectra_store::format::head::Head;
use vectra_store::format::index_file::{IndexEntry, IndexFile};
use vectra_store::format::manifest::Manifest;
use vectra_store::{BlobStore, CoreStore};

use crate::coordination::commit_wait;
use crate::error::ManagerError;

fn index_path(base: &str) -> String {
    format!("{base}.index")
}
fn catalog_path(base: &str) -> String {
    format!("{base}.catalog.json")
}
fn manifest_path_for(base: &str) -> String {
    format!("{base}.manifest.json")
}
fn head_path(base: &str) -> String {
    format!("{base}.head.json")
}

/// Knobs controlling a single [`IndexingManager::save`] call.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub segmented: bool,
    pub segment_bytes: usize,
    pub epoch: u64,
    pub include_ann: bool,
    /// Commit-wait bound in milliseconds; `0` skips commit-wait entirely.
    pub epsilon_ms: Millis,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            segmented: false,
            segment_bytes: 64 * 1024 * 1024,
            epoch: 0,
            include_ann: true,
            epsilon_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SaveOutcome {
    pub commit_ts: Millis,
    pub epoch: u64,
}

/// Controls how [`IndexingManager::open`] selects a manifest and whether it
/// rebuilds ANN state that wasn't embedded in the index file.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Read timestamp used against HEAD's bounded-staleness predicate. Only
    /// consulted when `use_head_for_reads` is set.
    pub read_ts: Millis,
    pub use_head_for_reads: bool,
    pub rebuild_if_needed: bool,
    pub hnsw_params: HnswParams,
    pub ivf_params: IvfParams,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_ts: Millis::MAX,
            use_head_for_reads: true,
            rebuild_if_needed: true,
            hnsw_params: HnswParams::default(),
            ivf_params: IvfParams::default(),
        }
    }
}

/// Rebuilds a fresh ANN strategy from every row currently in `store`.
/// Shared between open (when the embedded payload is missing or stale) and
/// the client facade's WAL-replay-on-attach path.
pub fn rebuild_ann_from_store(
    store: &CoreStore,
    strategy: Strategy,
    hnsw_params: HnswParams,
    ivf_params: IvfParams,
) -> Result<StrategyState, ManagerError> {
    let mut state = StrategyState::new(strategy, hnsw_params, ivf_params, store.dim, store.capacity());
    for i in 0..store.count() {
        let id = store.id_at(i);
        let vector = store.vector_at(i).to_vec();
        state.add(i, id, &vector, store, store.metric)?;
    }
    if let StrategyState::Ivf(ivf) = &mut state {
        if store.count() > 0 {
            ivf.train(store, store.metric, 42, 10);
        }
    }
    Ok(state)
}

/// Orchestrates persistence of a `(CoreStore, StrategyState)` pair across
/// the catalog/manifest/index-file/HEAD quartet, segmenting data across
/// whichever targets the configured CRUSH map resolves to.
pub struct IndexingManager {
    pub clock: Arc<dyn Clock>,
    pub index_store: Arc<dyn BlobStore>,
    pub data_targets: HashMap<String, Arc<dyn BlobStore>>,
    pub base: String,
    pub crush: CrushConfig,
    /// Minimum spacing enforced between successive commit timestamps.
    pub delta_ms: Millis,
    last_committed_ts: parking_lot::Mutex<Millis>,
}

impl IndexingManager {
    pub fn new(
        clock: Arc<dyn Clock>,
        index_store: Arc<dyn BlobStore>,
        data_targets: HashMap<String, Arc<dyn BlobStore>>,
        base: impl Into<String>,
        crush: CrushConfig,
        delta_ms: Millis,
    ) -> Self {
        Self {
            clock,
            index_store,
            data_targets,
            base: base.into(),
            crush,
            delta_ms,
            last_committed_ts: parking_lot::Mutex::new(0),
        }
    }

    /// 1. segment the store's live rows across placement targets, 2. write
    /// the catalog, 3. compute and stamp a commit timestamp onto the
    /// manifest, 4. build and write the index file (embedding ANN bytes
    /// when requested), 5. publish HEAD, 6. optionally commit-wait.
    pub async fn save(
        &self,
        store: &CoreStore,
        strategy: &StrategyState,
        options: SaveOptions,
    ) -> Result<SaveOutcome, ManagerError> {
        let prepare_ts = self.clock.now_ms();

        let rows: Vec<(VectorId, Option<Vec<u8>>, Vec<f32>)> = store
            .iter_live()
            .map(|(id, vector, meta)| (id, meta.clone(), vector.to_vec()))
            .collect();

        let seg_config = SegmenterConfig {
            base: self.base.clone(),
            segmented: options.segmented,
            segment_bytes: options.segment_bytes,
            epoch: options.epoch,
            commit_ts: 0,
        };
        let (pointers, mut manifest) = segment_and_write(&rows, &self.crush, &seg_config, &self.data_targets)?;

        let catalog = Catalog::new(store.dim as u32, store.metric, strategy.strategy());
        self.index_store.atomic_write(&catalog_path(&self.base), &catalog.to_json()?)?;

        let commit_ts = {
            let mut last = self.last_committed_ts.lock();
            let ts = prepare_ts.max(*last + self.delta_ms).max(self.clock.now_ms());
            *last = ts;
            ts
        };
        manifest.commit_ts = commit_ts;
        let manifest_path = manifest_path_for(&self.base);
        self.index_store.atomic_write(&manifest_path, &manifest.to_json()?)?;

        let entries = pointers
            .into_iter()
            .map(|p| IndexEntry {
                id: p.id,
                segment_name: p.segment,
                offset: p.offset,
                length: p.length,
            })
            .collect();

        let ann_bytes = if options.include_ann {
            match strategy {
                StrategyState::Bruteforce => None,
                StrategyState::Hnsw(h) => Some(h.serialize(store.count())),
                StrategyState::Ivf(i) => Some(i.serialize()),
            }
        } else {
            None
        };

        let index_file = IndexFile {
            metric: store.metric,
            dim: store.dim as u32,
            count: store.count() as u32,
            strategy: strategy.strategy(),
            ann_bytes,
            entries,
        };
        self.index_store
            .atomic_write(&index_path(&self.base), &index_file.encode()?)?;

        let head = Head {
            manifest: manifest_path,
            epoch: options.epoch,
            commit_ts,
        };
        self.index_store.atomic_write(&head_path(&self.base), &head.to_json()?)?;

        if options.epsilon_ms > 0 {
            commit_wait(self.clock.as_ref(), commit_ts, options.epsilon_ms).await;
        }

        tracing::info!(base = %self.base, epoch = options.epoch, commit_ts, "save completed");
        Ok(SaveOutcome { commit_ts, epoch: options.epoch })
    }

    fn manifest_for_read(&self, options: &OpenOptions) -> Result<Manifest, ManagerError> {
        let path = if options.use_head_for_reads {
            match self.index_store.read(&head_path(&self.base)) {
                Ok(bytes) => {
                    let head = Head::from_json(&bytes)?;
                    if head.is_readable_at(options.read_ts) {
                        head.manifest
                    } else {
                        tracing::debug!(
                            read_ts = options.read_ts,
                            commit_ts = head.commit_ts,
                            "HEAD not yet readable, falling back to default manifest"
                        );
                        manifest_path_for(&self.base)
                    }
                }
                Err(_) => manifest_path_for(&self.base),
            }
        } else {
            manifest_path_for(&self.base)
        };
        let bytes = self
            .index_store
            .read(&path)
            .map_err(|_| ManagerError::MissingState(format!("manifest not found: {path}")))?;
        Ok(Manifest::from_json(&bytes)?)
    }

    fn target_for(&self, manifest: &Manifest, segment_name: &str) -> Result<Arc<dyn BlobStore>, ManagerError> {
        let key = manifest
            .target_for(segment_name)
            .map(str::to_string)
            .or_else(|| vectra_placement::segment_target_key(segment_name, &self.crush));
        let key = key.ok_or_else(|| ManagerError::MissingSegment(segment_name.to_string()))?;
        self.data_targets
            .get(&key)
            .cloned()
            .ok_or_else(|| ManagerError::MissingSegment(format!("{segment_name} -> unknown target {key}")))
    }

    /// Reconstructs `(CoreStore, StrategyState)` from the index file,
    /// falling back to [`Self::rebuild_from_data`] when it's absent, and
    /// rebuilding ANN state when it's missing or was built with a
    /// different strategy than the catalog names.
    pub async fn open(&self, options: OpenOptions) -> Result<(CoreStore, StrategyState), ManagerError> {
        let index_bytes = match self.index_store.read(&index_path(&self.base)) {
            Ok(bytes) => bytes,
            Err(_) => return self.rebuild_from_data(&options).await,
        };
        let index = IndexFile::decode(&index_bytes).map_err(|e| ManagerError::FormatError(e.to_string()))?;

        let mut store = CoreStore::new(index.dim as usize, index.metric, (index.count as usize).max(1));
        let manifest = self.manifest_for_read(&options)?;

        let mut segment_cache: HashMap<String, Vec<u8>> = HashMap::new();
        for entry in &index.entries {
            if !segment_cache.contains_key(&entry.segment_name) {
                let store_ref = self.target_for(&manifest, &entry.segment_name)?;
                let bytes = store_ref.read(&entry.segment_name)?;
                segment_cache.insert(entry.segment_name.clone(), bytes);
            }
            let bytes = segment_cache.get(&entry.segment_name).unwrap();
            let row = data_segment::decode_row_at(bytes, entry.offset, entry.length)?;
            store.insert_or_update(row.id, &row.vector, row.meta, true)?;
        }

        let strategy = match &index.ann_bytes {
            Some(bytes) if index.strategy == Strategy::Hnsw => {
                let (hnsw, _count) = HnswState::deserialize(bytes, options.hnsw_params)?;
                StrategyState::Hnsw(hnsw)
            }
            Some(bytes) if index.strategy == Strategy::Ivf => StrategyState::Ivf(IvfState::deserialize(bytes)?),
            _ if options.rebuild_if_needed => {
                rebuild_ann_from_store(&store, index.strategy, options.hnsw_params, options.ivf_params)?
            }
            _ => StrategyState::new(index.strategy, options.hnsw_params, options.ivf_params, store.dim, store.capacity()),
        };

        tracing::info!(base = %self.base, count = store.count(), strategy = ?index.strategy, "open completed");
        Ok((store, strategy))
    }

    /// Reconstructs state purely from the catalog and every segment the
    /// manifest names, ignoring the index file entirely. Used when the
    /// index file is missing or corrupt.
    pub async fn rebuild_from_data(&self, options: &OpenOptions) -> Result<(CoreStore, StrategyState), ManagerError> {
        let catalog_bytes = self
            .index_store
            .read(&catalog_path(&self.base))
            .map_err(|_| ManagerError::MissingState(format!("catalog not found for {}", self.base)))?;
        let catalog = Catalog::from_json(&catalog_bytes)?;
        let metric: Metric = catalog.metric()?;
        let strategy: Strategy = catalog.strategy()?;

        let manifest = self.manifest_for_read(options)?;
        let mut store = CoreStore::new(catalog.dim as usize, metric, 1);

        for segment in &manifest.segments {
            let store_ref = self.target_for(&manifest, &segment.name)?;
            let bytes = store_ref.read(&segment.name)?;
            for row in data_segment::decode(&bytes)? {
                store.insert_or_update(row.id, &row.vector, row.meta, true)?;
            }
        }

        let strategy_state = rebuild_ann_from_store(&store, strategy, options.hnsw_params, options.ivf_params)?;
        tracing::info!(base = %self.base, count = store.count(), strategy = ?strategy, "rebuild_from_data completed");
        Ok((store, strategy_state))
    }
}
