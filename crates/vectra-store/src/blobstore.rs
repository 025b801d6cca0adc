//! Abstract storage collaborator. The core never touches a filesystem or a
//! network socket directly; every persisted byte passes through a
//! `BlobStore` implementation supplied by the embedder. Concrete adapters
//! (filesystem, in-memory, cache-fronted) are glue and out of scope here;
//! an in-memory adapter is provided under `#[cfg(test)]` for exercising the
//! persistence layer without touching a disk.

use crate::error::StoreError;

pub trait BlobStore: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn append(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// Durable replacement. Adapters backed by a filesystem typically
    /// implement this as write-to-temp-then-rename.
    fn atomic_write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// Deletes `path`. Optional in spirit (only rebalance cleanup needs
    /// it); implementations that cannot support deletion may return `Ok`
    /// without removing anything.
    fn del(&self, path: &str) -> Result<(), StoreError>;
    fn exists(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod memory {
    use super::BlobStore;
    use crate::error::StoreError;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    /// A process-memory `BlobStore` for tests: every `write`/`atomic_write`
    /// replaces the blob wholesale, `append` concatenates.
    #[derive(Default)]
    pub struct MemoryBlobStore {
        inner: RwLock<HashMap<String, Vec<u8>>>,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl BlobStore for MemoryBlobStore {
        fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
            self.inner
                .read()
                .get(path)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(path.to_string()))
        }

        fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
            self.inner.write().insert(path.to_string(), bytes.to_vec());
            Ok(())
        }

        fn append(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
            let mut guard = self.inner.write();
            let entry = guard.entry(path.to_string()).or_default();
            entry.extend_from_slice(bytes);
            Ok(())
        }

        fn atomic_write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
            self.write(path, bytes)
        }

        fn del(&self, path: &str) -> Result<(), StoreError> {
            self.inner.write().remove(path);
            Ok(())
        }

        fn exists(&self, path: &str) -> bool {
            self.inner.read().contains_key(path)
        }
    }

}
