use crate::storage::traits::{BatchOp, KvIter, KvStore, WriteBatch};
use anyhow::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// In-memory store (good for tests/dev). Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct MemKvStore {
    name: String,
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    compactions: Arc<RwLock<u64>>,
}

impl MemKvStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::new(RwLock::new(BTreeMap::new())),
            compactions: Arc::new(RwLock::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Number of times `compact` ran against this store.
    pub fn compactions(&self) -> u64 {
        *self.compactions.read()
    }
}

impl KvStore for MemKvStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut map = self.inner.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter> {
        let map = self.inner.read();
        let items = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(KvIter { items })
    }

    fn compact(&self) -> Result<()> {
        *self.compactions.write() += 1;
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }
}
