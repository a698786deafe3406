//! Compaction stage: full-range compaction of each physical database.
//!
//! Handles are compacted concurrently and independently. A failing handle
//! does not stop its siblings; once all are done the first failure in handle
//! order is returned.

use crate::storage::KvStore;
use crate::utils::{PrunerError, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// (store name, time spent) for each compacted store, in handle order
    pub compacted: Vec<(String, Duration)>,
}

pub async fn compact_all(handles: &[Arc<dyn KvStore>]) -> Result<CompactionReport> {
    let jobs = handles.iter().map(|db| {
        let db = db.clone();
        async move {
            let name = db.name();
            info!(store = %name, path = ?db.path(), "compacting");
            let started = Instant::now();
            let res = tokio::task::spawn_blocking(move || db.compact())
                .await
                .map_err(|e| format!("worker panicked: {e}"))
                .and_then(|r| r.map_err(|e| format!("{e:#}")));
            (name, started.elapsed(), res)
        }
    });

    let mut report = CompactionReport { compacted: Vec::with_capacity(handles.len()) };
    let mut first_err = None;
    for (name, took, res) in join_all(jobs).await {
        match res {
            Ok(()) => {
                info!(store = %name, took = ?took, "compacted");
                report.compacted.push((name, took));
            }
            Err(cause) => {
                error!(store = %name, error = %cause, "compaction failed");
                first_err.get_or_insert(PrunerError::Compaction { store: name, cause });
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KvIter, MemKvStore, WriteBatch};
    use std::path::PathBuf;

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn name(&self) -> String {
            "blockstore".into()
        }
        fn put(&self, _: &[u8], _: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
        fn get(&self, _: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(None)
        }
        fn delete(&self, _: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
        fn write_batch(&self, _: WriteBatch) -> anyhow::Result<()> {
            Ok(())
        }
        fn scan_prefix(&self, _: &[u8]) -> anyhow::Result<KvIter> {
            Ok(KvIter { items: vec![] })
        }
        fn compact(&self) -> anyhow::Result<()> {
            anyhow::bail!("io error: no space left on device")
        }
        fn path(&self) -> Option<PathBuf> {
            None
        }
    }

    #[tokio::test]
    async fn compacts_every_handle() {
        let app = MemKvStore::new("application");
        let state = MemKvStore::new("state");
        let handles: Vec<Arc<dyn KvStore>> = vec![Arc::new(app.clone()), Arc::new(state.clone())];

        let report = compact_all(&handles).await.unwrap();

        let names: Vec<&str> = report.compacted.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["application", "state"]);
        assert_eq!(app.compactions(), 1);
        assert_eq!(state.compactions(), 1);
    }

    #[test]
    fn nothing_in_scope_is_a_no_op() {
        let report = tokio_test::assert_ok!(tokio_test::block_on(compact_all(&[])));
        assert!(report.compacted.is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() {
        let app = MemKvStore::new("application");
        let state = MemKvStore::new("state");
        let handles: Vec<Arc<dyn KvStore>> = vec![Arc::new(app.clone()), Arc::new(BrokenStore), Arc::new(state.clone())];

        let err = compact_all(&handles).await.unwrap_err();

        assert!(matches!(err, PrunerError::Compaction { ref store, .. } if store == "blockstore"));
        assert_eq!(app.compactions(), 1);
        assert_eq!(state.compactions(), 1);
    }
}
