pub mod blockstore;
pub mod state_store;
pub mod pruner;

use crate::storage::{self, KvStore, StorageEngine};
use crate::utils::{PrunerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use blockstore::{BlockMeta, BlockPruneOutcome, BlockStore, BlockStoreState};
pub use state_store::StateStore;
pub use pruner::{HistoryCutoff, HistoryOutcome, HistoryPlan, HistoryPruner};

/// Heights deleted per write batch in the history stores.
pub const PRUNE_BATCH_HEIGHTS: u64 = 1000;

/// Oldest height still referenced by unexpired evidence. Consensus-state
/// pruning must stop below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EvidenceHeight(pub u64);

/// Evidence expiry rules persisted in the consensus-state store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceParams {
    pub max_age_num_blocks: u64,
}

impl EvidenceParams {
    /// Evidence for `height` has expired once the chain is more than
    /// `max_age_num_blocks` past it.
    pub fn is_expired(&self, height: u64, current_height: u64) -> bool {
        current_height.saturating_sub(height) > self.max_age_num_blocks
    }

    /// Oldest height whose evidence has not expired at `current_height`.
    pub fn retain_height(&self, current_height: u64) -> u64 {
        current_height.saturating_sub(self.max_age_num_blocks)
    }
}

/// Block and consensus-state history of a node, opened from its data directory.
pub struct Ledger {
    pub blocks: Arc<BlockStore>,
    pub states: Arc<StateStore>,
}

impl Ledger {
    pub fn new(blocks: Arc<dyn KvStore>, states: Arc<dyn KvStore>) -> Self {
        Self {
            blocks: Arc::new(BlockStore::new(blocks)),
            states: Arc::new(StateStore::new(states)),
        }
    }

    pub fn open(data_dir: &Path, engine: StorageEngine) -> Result<Self> {
        let blocks = storage::open_db(data_dir, storage::BLOCKSTORE_DB, engine)
            .map_err(|e| PrunerError::store_access(storage::BLOCKSTORE_DB, e))?;
        let states = storage::open_db(data_dir, storage::STATE_DB, engine)
            .map_err(|e| PrunerError::store_access(storage::STATE_DB, e))?;
        Ok(Self::new(blocks, states))
    }
}
