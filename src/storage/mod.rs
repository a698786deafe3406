//! Storage module: abstraction over the physical databases of a node.
//!
//! Engines: RocksDB (feature "rocksdb-db"), file-per-key fallback, in-memory (tests).
//! Use `storage::open_db(data_dir, name, engine)` to get an `Arc<dyn KvStore>` to pass to other modules.

pub mod traits;
pub mod fs_store;
pub mod mem_store;

#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;

pub use traits::{BatchOp, KvIter, KvStore, WriteBatch};
pub use fs_store::FsKvStore;
pub use mem_store::MemKvStore;

#[cfg(feature = "rocksdb")]
pub use rocksdb_store::RocksKvStore;

use anyhow::{bail, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Database names under the node's data directory.
pub const APPLICATION_DB: &str = "application";
pub const BLOCKSTORE_DB: &str = "blockstore";
pub const STATE_DB: &str = "state";

/// Engine selection enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    Fs,
    Memory,
    #[cfg(feature = "rocksdb")]
    RocksDb,
}

impl Default for StorageEngine {
    fn default() -> Self {
        #[cfg(feature = "rocksdb")]
        {
            StorageEngine::RocksDb
        }
        #[cfg(not(feature = "rocksdb"))]
        {
            StorageEngine::Fs
        }
    }
}

impl FromStr for StorageEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fs" => Ok(StorageEngine::Fs),
            "memory" | "memdb" => Ok(StorageEngine::Memory),
            #[cfg(feature = "rocksdb")]
            "rocksdb" => Ok(StorageEngine::RocksDb),
            #[cfg(not(feature = "rocksdb"))]
            "rocksdb" => bail!("backend rocksdb requires the rocksdb-db feature"),
            other => bail!("unknown storage backend {other:?}"),
        }
    }
}

impl fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageEngine::Fs => write!(f, "fs"),
            StorageEngine::Memory => write!(f, "memory"),
            #[cfg(feature = "rocksdb")]
            StorageEngine::RocksDb => write!(f, "rocksdb"),
        }
    }
}

/// Path of a named database inside the data directory (`<data>/<name>.db`).
pub fn db_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{name}.db"))
}

/// Open an existing named database. Never creates it.
pub fn open_db(data_dir: &Path, name: &str, engine: StorageEngine) -> Result<Arc<dyn KvStore>> {
    let path = db_path(data_dir, name);
    match engine {
        StorageEngine::Fs => {
            let s = FsKvStore::open(path)?;
            Ok(Arc::new(s))
        }
        StorageEngine::Memory => {
            // nothing persists between runs, so there is nothing to prune either
            Ok(Arc::new(MemKvStore::new(name)))
        }
        #[cfg(feature = "rocksdb")]
        StorageEngine::RocksDb => {
            let s = RocksKvStore::open(path)?;
            Ok(Arc::new(s))
        }
    }
}
