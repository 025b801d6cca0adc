//! Client facade: the single entry point embedders interact with day to
//! day. Every mutation goes WAL-first under the writer lock; reads take a
//! shared lock over the live store/strategy pair and never touch the WAL.

use std::sync::Arc;

use parking_lot::RwLock;
use vectra_core::{Metric, Strategy, VectorId};
use vectra_index::filter::{AttributeIndexReader, AttrsAccessor, FilterExpr};
use vectra_index::{HnswParams, IvfParams, StrategyState};
use vectra_store::core_store::Meta;
use vectra_store::wal::{ReplayStats, WalRecord};
use vectra_store::{BlobStore, CoreStore};

use crate::coordination::WriterLock;
use crate::error::ClientError;
use crate::manager::rebuild_ann_from_store;

/// Construction knobs for a [`Client`].
pub struct ClientConfig {
    pub dim: usize,
    pub metric: Metric,
    pub strategy: Strategy,
    pub hnsw_params: HnswParams,
    pub ivf_params: IvfParams,
    pub initial_capacity: usize,
    pub wal_store: Arc<dyn BlobStore>,
    pub wal_path: String,
    pub wal_with_footer: bool,
}

/// The embeddable client: a live `(CoreStore, StrategyState)` pair behind
/// read-write locks, a write-ahead log, and a single-writer lock
/// serializing every mutating call.
pub struct Client {
    store: RwLock<CoreStore>,
    strategy: RwLock<StrategyState>,
    wal: vectra_store::wal::WalRuntime,
    lock: WriterLock,
    metric: Metric,
    hnsw_params: HnswParams,
    ivf_params: IvfParams,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let store = CoreStore::new(config.dim, config.metric, config.initial_capacity.max(1));
        let strategy = StrategyState::new(
            config.strategy,
            config.hnsw_params,
            config.ivf_params,
            config.dim,
            config.initial_capacity.max(1),
        );
        Self {
            store: RwLock::new(store),
            strategy: RwLock::new(strategy),
            wal: vectra_store::wal::WalRuntime::new(config.wal_store, config.wal_path, config.wal_with_footer),
            lock: WriterLock::new(),
            metric: config.metric,
            hnsw_params: config.hnsw_params,
            ivf_params: config.ivf_params,
        }
    }

    /// Inserts a new id, or overwrites an existing one's vector and meta.
    pub async fn upsert(&self, id: VectorId, vector: Vec<f32>, meta: Meta) -> Result<(), ClientError> {
        self.lock
            .run_exclusive(|| async {
                self.wal.append(&[WalRecord::Upsert {
                    id,
                    vector: vector.clone(),
                    meta: meta.clone(),
                }])?;

                let mut store = self.store.write();
                let mut strategy = self.strategy.write();
                let outcome = store.insert_or_update(id, &vector, meta, true)?;
                strategy.add(outcome.index, id, &vector, &store, self.metric)?;
                tracing::debug!(op = "upsert", id, dim = store.dim, metric = ?self.metric, "client write");
                Ok(())
            })
            .await
    }

    /// Removes `id`. Tombstones its row in whichever strategy is active;
    /// for HNSW, the row `CoreStore`'s swap-with-last compaction reuses
    /// stays tombstoned until a `compact_hnsw` maintenance pass, even
    /// though the id swapped into it is still live in the store — callers
    /// relying heavily on HNSW recall after churn should schedule periodic
    /// compaction.
    pub async fn remove(&self, id: VectorId) -> Result<bool, ClientError> {
        self.lock
            .run_exclusive(|| async {
                self.wal.append(&[WalRecord::Remove { id }])?;

                let mut store = self.store.write();
                let mut strategy = self.strategy.write();
                let Some(index) = store.index_of(id) else {
                    tracing::debug!(op = "remove", id, dim = store.dim, metric = ?self.metric, found = false, "client write");
                    return Ok(false);
                };
                store.remove_by_id(id);
                strategy.remove(index, id);
                tracing::debug!(op = "remove", id, dim = store.dim, metric = ?self.metric, found = true, "client write");
                Ok(true)
            })
            .await
    }

    /// Overwrites `id`'s metadata without touching its vector or ANN
    /// state.
    pub async fn set_meta(&self, id: VectorId, meta: Meta) -> Result<(), ClientError> {
        self.lock
            .run_exclusive(|| async {
                self.wal.append(&[WalRecord::SetMeta { id, meta: meta.clone() }])?;
                let mut store = self.store.write();
                store.update_meta(id, meta)?;
                tracing::debug!(op = "set_meta", id, dim = store.dim, metric = ?self.metric, "client write");
                Ok(())
            })
            .await
    }

    /// Returns `id`'s vector and metadata, if present.
    pub fn get(&self, id: VectorId) -> Option<(Vec<f32>, Meta)> {
        let store = self.store.read();
        let index = store.index_of(id)?;
        Some((store.vector_at(index).to_vec(), store.get_meta(id).cloned().unwrap_or(None)))
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.store.read().contains(id)
    }

    pub fn count(&self) -> usize {
        self.store.read().count()
    }

    /// Approximate top-k search, optionally combined with a filter
    /// expression per the active strategy's hard/soft-filter rules.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        expr: Option<&FilterExpr>,
        attrs: &dyn AttrsAccessor,
        reader: &dyn AttributeIndexReader,
    ) -> Result<Vec<(VectorId, f32)>, ClientError> {
        let store = self.store.read();
        let strategy = self.strategy.read();
        Ok(vectra_index::strategy::search(&strategy, &store, self.metric, query, k, expr, attrs, reader)?)
    }

    /// Replays the WAL into the store and fully rebuilds ANN state from the
    /// replayed rows, since the WAL only captures store-level mutations,
    /// never graph/posting-list structure. Call once on attach, before
    /// serving traffic.
    pub async fn replay_on_attach(&self) -> Result<ReplayStats, ClientError> {
        self.lock
            .run_exclusive(|| async {
                let mut store = self.store.write();
                let stats = self.wal.replay_into(&mut store)?;
                let rebuilt = rebuild_ann_from_store(&store, self.strategy.read().strategy(), self.hnsw_params, self.ivf_params)?;
                *self.strategy.write() = rebuilt;
                Ok(stats)
            })
            .await
    }

    /// Truncates the WAL, typically called right after a successful save
    /// under the same exclusive section.
    pub async fn truncate_wal(&self) -> Result<(), ClientError> {
        self.lock.run_exclusive(|| async { Ok(self.wal.truncate()?) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectra_index::filter::NoAttrs;
    use vectra_store::blobstore::memory::MemoryBlobStore;

    struct NoIndex;
    impl AttributeIndexReader for NoIndex {
        fn eq(&self, _key: &str, _value: &serde_json::Value) -> Option<roaring::RoaringBitmap> {
            None
        }
        fn exists(&self, _key: &str) -> Option<roaring::RoaringBitmap> {
            None
        }
        fn range(&self, _key: &str, _range: vectra_index::filter::RangeBounds) -> Option<roaring::RoaringBitmap> {
            None
        }
    }

    fn client(strategy: Strategy) -> Client {
        Client::new(ClientConfig {
            dim: 2,
            metric: Metric::Dot,
            strategy,
            hnsw_params: HnswParams::default(),
            ivf_params: IvfParams { nlist: 2, nprobe: 2 },
            initial_capacity: 4,
            wal_store: Arc::new(MemoryBlobStore::new()),
            wal_path: "client.wal".to_string(),
            wal_with_footer: true,
        })
    }

    #[tokio::test]
    async fn upsert_then_get() {
        let c = client(Strategy::Bruteforce);
        c.upsert(1, vec![1.0, 0.0], Some(b"a".to_vec())).await.unwrap();
        let (vector, meta) = c.get(1).unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(meta.as_deref(), Some(&b"a"[..]));
    }

    #[tokio::test]
    async fn remove_then_get_is_none() {
        let c = client(Strategy::Bruteforce);
        c.upsert(1, vec![1.0, 0.0], None).await.unwrap();
        assert!(c.remove(1).await.unwrap());
        assert!(c.get(1).is_none());
        assert!(!c.remove(1).await.unwrap());
    }

    #[tokio::test]
    async fn search_finds_inserted_vectors() {
        let c = client(Strategy::Hnsw);
        for id in 1..=5u32 {
            c.upsert(id, vec![id as f32, 0.0], None).await.unwrap();
        }
        let results = c.search(&[5.0, 0.0], 1, None, &NoAttrs, &NoIndex).unwrap();
        assert_eq!(results[0].0, 5);
    }

    #[tokio::test]
    async fn replay_on_attach_restores_from_wal() {
        let wal_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let config_store = wal_store.clone();
        {
            let c = Client::new(ClientConfig {
                dim: 2,
                metric: Metric::Dot,
                strategy: Strategy::Bruteforce,
                hnsw_params: HnswParams::default(),
                ivf_params: IvfParams::default(),
                initial_capacity: 4,
                wal_store: config_store,
                wal_path: "replay.wal".to_string(),
                wal_with_footer: true,
            });
            c.upsert(1, vec![1.0, 0.0], None).await.unwrap();
            c.upsert(2, vec![0.0, 1.0], None).await.unwrap();
        }

        let c2 = Client::new(ClientConfig {
            dim: 2,
            metric: Metric::Dot,
            strategy: Strategy::Bruteforce,
            hnsw_params: HnswParams::default(),
            ivf_params: IvfParams::default(),
            initial_capacity: 4,
            wal_store,
            wal_path: "replay.wal".to_string(),
            wal_with_footer: true,
        });
        let stats = c2.replay_on_attach().await.unwrap();
        assert_eq!(stats.applied, 2);
        assert!(c2.contains(1) && c2.contains(2));
    }
}
