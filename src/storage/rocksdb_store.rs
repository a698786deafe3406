//! RocksDB engine (feature `rocksdb-db`).

use crate::storage::traits::{BatchOp, KvIter, KvStore, WriteBatch};
use anyhow::Result;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch as RocksWriteBatch, DB};
use std::path::{Path, PathBuf};

pub struct RocksKvStore {
    name: String,
    db: DB,
    path: PathBuf,
}

impl RocksKvStore {
    /// Open an existing database. Never creates one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(false);
        // bulk deletes leave many tombstones; full-range compaction is explicit
        opts.set_disable_auto_compactions(true);
        let db = DB::open(&opts, path.as_ref())?;
        let name = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "rocksdb".into());
        Ok(Self { name, db, path: path.as_ref().to_path_buf() })
    }
}

impl KvStore for RocksKvStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut b = RocksWriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => b.put(k, v),
                BatchOp::Delete(k) => b.delete(k),
            }
        }
        self.db.write(b)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter> {
        let mut items = Vec::new();
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            items.push((k.to_vec(), v.to_vec()));
        }
        Ok(KvIter { items })
    }

    fn compact(&self) -> Result<()> {
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}
