//! Versioned multi-store over one shared physical database.
//!
//! Key layout (all partitions share the `application` database):
//! - `s/latest`                         -> bincode u64, latest committed version
//! - `s/k:<name>/r<version be64>`       -> bincode `RootRecord`
//! - `s/k:<name>/n<version be64><key>`  -> value written at that version
//!
//! Each version owns its root record and its write set, so deleting a
//! version is a prefix delete plus one key.

use crate::policy::PartitionKey;
use crate::state::versioned::{StoreMounter, VersionedStore};
use crate::storage::{KvStore, WriteBatch};
use crate::utils::Interrupted;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const LATEST_KEY: &[u8] = b"s/latest";
const ROOT_TAG: u8 = b'r';
const NODE_TAG: u8 = b'n';

/// Commit record of one partition version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootRecord {
    pub version: u64,
    /// SHA-256 over the previous root and this version's write set
    pub root_hash: [u8; 32],
    /// number of keys written at this version
    pub writes: u64,
}

fn partition_prefix(key: &PartitionKey) -> Vec<u8> {
    format!("s/k:{}/", key.name()).into_bytes()
}

fn tagged(prefix: &[u8], tag: u8, version: Option<u64>) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + 9);
    k.extend_from_slice(prefix);
    k.push(tag);
    if let Some(v) = version {
        k.extend_from_slice(&v.to_be_bytes());
    }
    k
}

fn decode_version(key: &[u8], root_prefix_len: usize) -> Result<u64> {
    let raw = key
        .get(root_prefix_len..root_prefix_len + 8)
        .context("truncated root record key")?;
    let mut b = [0u8; 8];
    b.copy_from_slice(raw);
    Ok(u64::from_be_bytes(b))
}

/// The application store: hands out partition views over the shared handle.
#[derive(Clone)]
pub struct MultiStore {
    db: Arc<dyn KvStore>,
}

impl MultiStore {
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<dyn KvStore> {
        &self.db
    }

    /// Mount one partition. Cheap; does no I/O.
    pub fn mount_partition(&self, key: &PartitionKey) -> Result<PartitionStore> {
        if key.name().is_empty() || key.name().contains('/') {
            bail!("invalid partition name {:?}", key.name());
        }
        Ok(PartitionStore {
            db: self.db.clone(),
            key: key.clone(),
            prefix: partition_prefix(key),
            latest: None,
        })
    }

    /// Latest version recorded across the whole multi-store.
    pub fn latest_version(&self) -> Result<Option<u64>> {
        match self.db.get(LATEST_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).context("decoding s/latest")?)),
            None => Ok(None),
        }
    }

    /// Commit one version for a set of partitions and advance `s/latest`.
    /// Used to build node databases for tests and tooling.
    pub fn commit(&self, version: u64, writes: &[(PartitionKey, Vec<(Vec<u8>, Vec<u8>)>)]) -> Result<()> {
        for (key, kvs) in writes {
            let mut part = self.mount_partition(key)?;
            part.load_latest_version()?;
            part.commit(version, kvs)?;
        }
        self.db.put(LATEST_KEY, &bincode::serialize(&version)?)?;
        Ok(())
    }
}

impl StoreMounter for MultiStore {
    fn mount(&self, key: &PartitionKey) -> Result<Box<dyn VersionedStore>> {
        Ok(Box::new(self.mount_partition(key)?))
    }
}

/// One partition's view over the shared database.
pub struct PartitionStore {
    db: Arc<dyn KvStore>,
    key: PartitionKey,
    prefix: Vec<u8>,
    latest: Option<RootRecord>,
}

impl PartitionStore {
    fn root_key(&self, version: u64) -> Vec<u8> {
        tagged(&self.prefix, ROOT_TAG, Some(version))
    }

    fn node_prefix(&self, version: u64) -> Vec<u8> {
        tagged(&self.prefix, NODE_TAG, Some(version))
    }

    pub fn latest(&self) -> Option<&RootRecord> {
        self.latest.as_ref()
    }

    /// Write `kvs` as a new version on top of the loaded latest one.
    pub fn commit(&mut self, version: u64, kvs: &[(Vec<u8>, Vec<u8>)]) -> Result<RootRecord> {
        let prev = self.latest.as_ref();
        if let Some(prev) = prev {
            if version <= prev.version {
                bail!("partition {}: version {} is not above latest {}", self.key, version, prev.version);
            }
        }

        let mut sorted: Vec<&(Vec<u8>, Vec<u8>)> = kvs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut h = Sha256::new();
        h.update(prev.map(|p| p.root_hash).unwrap_or([0u8; 32]));
        h.update(version.to_be_bytes());
        let mut batch = WriteBatch::new();
        let node_prefix = self.node_prefix(version);
        for (k, v) in sorted.iter().map(|kv| (&kv.0, &kv.1)) {
            h.update((k.len() as u64).to_be_bytes());
            h.update(k);
            h.update((v.len() as u64).to_be_bytes());
            h.update(v);
            let mut nk = node_prefix.clone();
            nk.extend_from_slice(k);
            batch.put(nk, v.clone());
        }

        let record = RootRecord { version, root_hash: h.finalize().into(), writes: kvs.len() as u64 };
        batch.put(self.root_key(version), bincode::serialize(&record)?);
        self.db.write_batch(batch)?;
        debug!(partition = %self.key, version, root = %hex::encode(record.root_hash), "committed version");
        self.latest = Some(record.clone());
        Ok(record)
    }
}

impl VersionedStore for PartitionStore {
    fn key(&self) -> &PartitionKey {
        &self.key
    }

    fn load_latest_version(&mut self) -> Result<Option<u64>> {
        let roots = self.db.scan_prefix(&tagged(&self.prefix, ROOT_TAG, None))?;
        let Some((k, v)) = roots.items.last() else {
            self.latest = None;
            return Ok(None);
        };
        let version = decode_version(k, self.prefix.len() + 1)?;
        let record: RootRecord = bincode::deserialize(v)
            .with_context(|| format!("partition {}: corrupt root record at version {version}", self.key))?;
        if record.version != version {
            bail!(
                "partition {}: root record key says version {version} but record says {}",
                self.key,
                record.version
            );
        }
        self.latest = Some(record);
        Ok(Some(version))
    }

    fn versions(&self) -> Result<Vec<u64>> {
        let root_prefix = tagged(&self.prefix, ROOT_TAG, None);
        let keys = self.db.scan_prefix(&root_prefix)?.keys();
        keys.iter().map(|k| decode_version(k, root_prefix.len())).collect()
    }

    fn prune_versions(&self, versions: &[u64], batch: usize, cancel: &CancellationToken) -> Result<u64> {
        let mut deleted = 0u64;
        for chunk in versions.chunks(batch.max(1)) {
            if cancel.is_cancelled() {
                return Err(Interrupted.into());
            }
            let mut wb = WriteBatch::new();
            for &version in chunk {
                for k in self.db.scan_prefix(&self.node_prefix(version))?.keys() {
                    wb.delete(k);
                }
                wb.delete(self.root_key(version));
            }
            self.db
                .write_batch(wb)
                .with_context(|| format!("partition {}: deleting {} versions", self.key, chunk.len()))?;
            deleted += chunk.len() as u64;
            debug!(partition = %self.key, deleted, total = versions.len(), "pruned batch");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemKvStore;

    fn seeded(versions: u64) -> (MemKvStore, MultiStore) {
        let mem = MemKvStore::new("application");
        let ms = MultiStore::new(Arc::new(mem.clone()));
        let bank = PartitionKey::new("bank");
        for v in 1..=versions {
            ms.commit(v, &[(bank.clone(), vec![(b"balance".to_vec(), v.to_be_bytes().to_vec())])]).unwrap();
        }
        (mem, ms)
    }

    #[test]
    fn versions_and_latest_after_commits() {
        let (_, ms) = seeded(5);
        let mut part = ms.mount_partition(&PartitionKey::new("bank")).unwrap();
        assert_eq!(part.load_latest_version().unwrap(), Some(5));
        assert_eq!(part.versions().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(ms.latest_version().unwrap(), Some(5));
    }

    #[test]
    fn root_hash_chains_versions() {
        let (_, ms) = seeded(2);
        let mut part = ms.mount_partition(&PartitionKey::new("bank")).unwrap();
        part.load_latest_version().unwrap();
        let first = part.latest().unwrap().root_hash;
        let rec = part.commit(3, &[(b"balance".to_vec(), vec![0])]).unwrap();
        assert_ne!(rec.root_hash, first);
        assert!(part.commit(3, &[]).is_err());
    }

    #[test]
    fn prune_removes_roots_and_write_sets() {
        let (mem, ms) = seeded(10);
        let part = ms.mount_partition(&PartitionKey::new("bank")).unwrap();
        let before = mem.len();

        let n = part.prune_versions(&[1, 2, 3, 4], 3, &CancellationToken::new()).unwrap();

        assert_eq!(n, 4);
        assert_eq!(part.versions().unwrap(), vec![5, 6, 7, 8, 9, 10]);
        assert_eq!(mem.len(), before - 8);
    }

    #[test]
    fn prune_stops_when_cancelled() {
        let (_, ms) = seeded(4);
        let part = ms.mount_partition(&PartitionKey::new("bank")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = part.prune_versions(&[1, 2], 1, &cancel).unwrap_err();
        assert!(err.downcast_ref::<Interrupted>().is_some());
        assert_eq!(part.versions().unwrap().len(), 4);
    }

    #[test]
    fn partitions_do_not_see_each_other() {
        let (_, ms) = seeded(3);
        let mut gov = ms.mount_partition(&PartitionKey::new("gov")).unwrap();
        assert_eq!(gov.load_latest_version().unwrap(), None);
        assert!(gov.versions().unwrap().is_empty());
    }

    #[test]
    fn corrupt_root_record_fails_load() {
        let (mem, ms) = seeded(2);
        let mut part = ms.mount_partition(&PartitionKey::new("bank")).unwrap();
        mem.put(&part.root_key(2), b"garbage").unwrap();
        assert!(part.load_latest_version().is_err());
    }
}
