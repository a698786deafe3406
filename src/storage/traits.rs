use anyhow::Result;
use std::path::PathBuf;

/// Simple KV iterator returned by `scan_prefix`
pub struct KvIter {
    // each item: (key, value), ascending by key
    pub items: Vec<(Vec<u8>, Vec<u8>)>,
}

impl KvIter {
    pub fn keys(self) -> Vec<Vec<u8>> {
        self.items.into_iter().map(|(k, _)| k).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Engine-agnostic write batch. Engines apply it atomically where they can.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Core key-value store trait (synchronous).
///
/// One instance is one physical database (`application`, `blockstore`,
/// `state`). Instances are shared across worker threads behind an `Arc`.
pub trait KvStore: Send + Sync + 'static {
    fn name(&self) -> String;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply a write batch
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Scan by prefix. Returns the full set sorted by key.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter>;

    /// Full-range compaction, reclaiming space held by deleted records.
    fn compact(&self) -> Result<()>;

    /// Path where the engine stores data (None for in-memory engines)
    fn path(&self) -> Option<PathBuf>;
}
