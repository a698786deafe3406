//! Pruning orchestrator.
//!
//! `prune`: validate config, open databases, plan history pruning (the
//! retention floor is checked here, before anything is deleted), run the
//! history pruner and the store-pruning pool concurrently, then compact.
//! `compact`: compaction only.

use crate::ledger::{HistoryOutcome, HistoryPruner, Ledger};
use crate::policy::{PartitionKey, RetentionProfile, MIN_RETAIN_BLOCKS_FLOOR};
use crate::pruning::compaction::{compact_all, CompactionReport};
use crate::pruning::pool::{PoolConfig, PoolReport, StorePruningPool};
use crate::state::MultiStore;
use crate::storage::{self, KvStore, StorageEngine};
use crate::utils::{PrunerError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Immutable parameters of one run, resolved once from flags, config file and profile.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub home: PathBuf,
    pub data_dir: PathBuf,
    pub backend: StorageEngine,
    pub profile: RetentionProfile,
    pub batch: usize,
    pub parallel_limit: usize,
    pub partitions: Vec<PartitionKey>,
    /// application store in scope
    pub cosmos_sdk: bool,
    /// block store and consensus-state store in scope
    pub tendermint: bool,
    pub history_floor: u64,
}

impl RunConfig {
    /// At least one database group must be in scope. Checked by both commands.
    pub fn validate_scope(&self) -> Result<()> {
        if !self.cosmos_sdk && !self.tendermint {
            return Err(PrunerError::Config("both cosmos-sdk and tendermint are disabled, nothing to do".into()));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_scope()?;
        if self.batch == 0 {
            return Err(PrunerError::Config("batch must be greater than 0".into()));
        }
        if self.parallel_limit == 0 {
            return Err(PrunerError::Config("parallel-limit must be greater than 0".into()));
        }
        HistoryPruner::check_retention(self.profile.min_retain_blocks, self.history_floor)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            keep_recent: self.profile.keep_recent_versions,
            keep_every: self.profile.keep_every(),
            batch: self.batch,
            parallel_limit: self.parallel_limit,
        }
    }

    pub fn print_parameters(&self) {
        println!("data dir: {}", self.data_dir.display());
        println!("backend: {}", self.backend);
        println!("pruning: {}", self.profile.name);
        println!("min-retain-blocks: {}", self.profile.min_retain_blocks);
        println!("pruning-keep-recent: {}", self.profile.keep_recent_versions);
        println!("pruning-keep-every: {}", self.profile.keep_every_interval);
        println!("batch: {}", self.batch);
        println!("parallel-limit: {}", self.parallel_limit);
        println!("cosmos-sdk: {}, tendermint: {}", self.cosmos_sdk, self.tendermint);
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::new(),
            data_dir: PathBuf::from("data"),
            backend: StorageEngine::default(),
            profile: RetentionProfile::default(),
            batch: 100_000,
            parallel_limit: 16,
            partitions: Vec::new(),
            cosmos_sdk: true,
            tendermint: true,
            history_floor: MIN_RETAIN_BLOCKS_FLOOR,
        }
    }
}

/// Opened node databases. A store is `None` when it is out of scope for the run.
pub struct Databases {
    pub application: Option<Arc<dyn KvStore>>,
    pub ledger: Option<Ledger>,
}

impl Databases {
    pub fn open(cfg: &RunConfig) -> Result<Self> {
        let application = if cfg.cosmos_sdk {
            let db = storage::open_db(&cfg.data_dir, storage::APPLICATION_DB, cfg.backend)
                .map_err(|e| PrunerError::store_access(storage::APPLICATION_DB, e))?;
            Some(db)
        } else {
            None
        };
        let ledger = if cfg.tendermint { Some(Ledger::open(&cfg.data_dir, cfg.backend)?) } else { None };
        info!(data_dir = %cfg.data_dir.display(), backend = %cfg.backend, "databases opened");
        Ok(Self { application, ledger })
    }

    /// Handles in compaction order: application, blockstore, state.
    pub fn handles(&self) -> Vec<Arc<dyn KvStore>> {
        let mut out = Vec::with_capacity(3);
        if let Some(db) = &self.application {
            out.push(db.clone());
        }
        if let Some(ledger) = &self.ledger {
            out.push(ledger.blocks.db().clone());
            out.push(ledger.states.db().clone());
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub history: Option<HistoryOutcome>,
    pub pool: Option<PoolReport>,
    pub compaction: CompactionReport,
}

/// Runs `prune` and `compact` for one resolved configuration.
pub struct Orchestrator {
    cfg: RunConfig,
}

impl Orchestrator {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    pub async fn prune(&self, cancel: &CancellationToken) -> Result<RunReport> {
        self.cfg.validate()?;
        self.cfg.print_parameters();
        let dbs = Databases::open(&self.cfg)?;
        self.prune_databases(&dbs, cancel).await
    }

    pub async fn compact(&self, cancel: &CancellationToken) -> Result<CompactionReport> {
        self.cfg.validate_scope()?;
        let dbs = Databases::open(&self.cfg)?;
        self.compact_databases(&dbs, cancel).await
    }

    /// Prune already opened databases.
    pub async fn prune_databases(&self, dbs: &Databases, cancel: &CancellationToken) -> Result<RunReport> {
        self.cfg.validate()?;

        let history = dbs.ledger.as_ref().map(|ledger| {
            HistoryPruner::new(ledger.blocks.clone(), ledger.states.clone(), self.cfg.profile.min_retain_blocks)
                .with_floor(self.cfg.history_floor)
        });
        let plan = match &history {
            Some(h) => Some(h.plan()?),
            None => None,
        };

        let history_phase = async {
            let (Some(pruner), Some(plan)) = (&history, plan) else {
                return Ok(None);
            };
            let res = pruner.execute(plan, cancel).await;
            if let Err(e) = &res {
                error!(error = %e, "history pruning failed");
                cancel.cancel();
            }
            res.map(Some)
        };

        let pool_phase = async {
            let Some(db) = &dbs.application else {
                return Ok(None);
            };
            let cfg = self.cfg.pool_config();
            info!(
                partitions = self.cfg.partitions.len(),
                keep_recent = cfg.keep_recent,
                keep_every = cfg.keep_every,
                batch = cfg.batch,
                parallel_limit = cfg.parallel_limit,
                "pruning application state"
            );
            let pool = StorePruningPool::new(Arc::new(MultiStore::new(db.clone())), cfg);
            let res = pool.run(&self.cfg.partitions, cancel).await;
            if let Err(e) = &res {
                error!(error = %e, "application state pruning failed");
                cancel.cancel();
            }
            res.map(Some)
        };

        let (history, pool) = match tokio::join!(history_phase, pool_phase) {
            (Ok(h), Ok(p)) => (h, p),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
            // a phase cancelled by its failing sibling reports the sibling's error
            (Err(PrunerError::Cancelled), Err(e)) => return Err(e),
            (Err(e), Err(_)) => return Err(e),
        };

        let compaction = self.compact_databases(dbs, cancel).await?;
        info!(
            versions_pruned = pool.as_ref().map(|p| p.versions_pruned()),
            databases_compacted = compaction.compacted.len(),
            "pruning finished"
        );
        Ok(RunReport { history, pool, compaction })
    }

    pub async fn compact_databases(&self, dbs: &Databases, cancel: &CancellationToken) -> Result<CompactionReport> {
        if cancel.is_cancelled() {
            return Err(PrunerError::Cancelled);
        }
        compact_all(&dbs.handles()).await
    }
}
