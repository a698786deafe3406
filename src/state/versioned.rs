//! Versioned store abstractions consumed by the store-pruning pool.
//! - VersionedStore: one mounted partition (load latest, list versions, prune versions)
//! - StoreMounter: mounts a partition against a shared physical store

use crate::policy::PartitionKey;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// One mounted partition of the application store.
pub trait VersionedStore: Send {
    fn key(&self) -> &PartitionKey;

    /// Load the latest on-disk state. `None` for a partition with no versions.
    fn load_latest_version(&mut self) -> Result<Option<u64>>;

    /// All versions physically present, ascending, unique.
    fn versions(&self) -> Result<Vec<u64>>;

    /// Delete `versions`, at most `batch` versions per underlying write.
    /// Checks `cancel` before each write and fails with `Interrupted` once it fires.
    /// Returns the number of versions deleted.
    fn prune_versions(&self, versions: &[u64], batch: usize, cancel: &CancellationToken) -> Result<u64>;
}

/// Mounts partitions. Implementations must allow concurrent mounts of
/// distinct partitions from several worker threads.
pub trait StoreMounter: Send + Sync + 'static {
    fn mount(&self, key: &PartitionKey) -> Result<Box<dyn VersionedStore>>;
}
