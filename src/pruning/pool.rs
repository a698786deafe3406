//! Bounded store-pruning pool.
//!
//! One job per partition: mount, load latest, enumerate versions, compute the
//! prune set, delete in batches. At most `parallel_limit` jobs run at once; a
//! permit is taken before a job is spawned, so queued partitions wait in
//! submission order. A failing partition never cancels its siblings: every
//! job runs to completion or failure before the first error is reported.

use crate::policy::PartitionKey;
use crate::pruning::outcome::FirstError;
use crate::pruning::prune_set::prune_set;
use crate::state::StoreMounter;
use crate::utils::{classify, PrunerError, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub keep_recent: u64,
    pub keep_every: Option<u64>,
    /// max versions per underlying delete call
    pub batch: usize,
    pub parallel_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: PartitionKey,
    pub latest: Option<u64>,
    pub versions: usize,
    pub pruned: u64,
}

/// Per-partition results of the partitions that succeeded, in submission order.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub partitions: Vec<PartitionReport>,
}

impl PoolReport {
    pub fn versions_pruned(&self) -> u64 {
        self.partitions.iter().map(|p| p.pruned).sum()
    }
}

pub struct StorePruningPool {
    mounter: Arc<dyn StoreMounter>,
    cfg: PoolConfig,
}

impl StorePruningPool {
    pub fn new(mounter: Arc<dyn StoreMounter>, cfg: PoolConfig) -> Self {
        Self { mounter, cfg }
    }

    pub async fn run(&self, partitions: &[PartitionKey], cancel: &CancellationToken) -> Result<PoolReport> {
        let slots = Arc::new(Semaphore::new(self.cfg.parallel_limit.max(1)));
        let errors = Arc::new(FirstError::new());
        let mut handles = Vec::with_capacity(partitions.len());

        for (index, key) in partitions.iter().enumerate() {
            let permit = slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PrunerError::Config(format!("pool semaphore closed: {e}")))?;

            let mounter = self.mounter.clone();
            let cfg = self.cfg.clone();
            let key = key.clone();
            let token = cancel.clone();
            let errors = errors.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                match prune_partition(mounter.as_ref(), &key, &cfg, &token) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        error!(partition = %key, error = %e, "partition pruning failed");
                        errors.record(index, e);
                        None
                    }
                }
            }));
        }

        let mut report = PoolReport::default();
        for (index, (key, handle)) in partitions.iter().zip(handles).enumerate() {
            match handle.await {
                Ok(Some(r)) => report.partitions.push(r),
                Ok(None) => {}
                Err(e) => errors.record(
                    index,
                    PrunerError::PruneFailed { partition: key.to_string(), cause: format!("worker panicked: {e}") },
                ),
            }
        }

        if let Some(err) = errors.take() {
            return Err(err);
        }
        info!(
            partitions = report.partitions.len(),
            versions_pruned = report.versions_pruned(),
            "application state pruned"
        );
        Ok(report)
    }
}

fn prune_partition(
    mounter: &dyn StoreMounter,
    key: &PartitionKey,
    cfg: &PoolConfig,
    cancel: &CancellationToken,
) -> Result<PartitionReport> {
    if cancel.is_cancelled() {
        return Err(PrunerError::Cancelled);
    }
    let fail = |step: &str, cause: String| PrunerError::PruneFailed {
        partition: key.to_string(),
        cause: format!("{step}: {cause}"),
    };

    let mut store = mounter.mount(key).map_err(|e| fail("mount", format!("{e:#}")))?;
    let latest = store.load_latest_version().map_err(|e| fail("load latest version", format!("{e:#}")))?;
    let versions = store.versions().map_err(|e| fail("list versions", format!("{e:#}")))?;
    let targets = prune_set(&versions, cfg.keep_recent, cfg.keep_every);

    info!(
        partition = %key,
        latest,
        versions = versions.len(),
        to_prune = targets.len(),
        first = targets.first().copied(),
        last = targets.last().copied(),
        "pruning partition"
    );

    let pruned = if targets.is_empty() {
        0
    } else {
        store
            .prune_versions(&targets, cfg.batch, cancel)
            .map_err(|e| classify(e, |cause| fail("prune versions", cause)))?
    };

    Ok(PartitionReport { partition: key.clone(), latest, versions: versions.len(), pruned })
}
