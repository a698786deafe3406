//! History pruner: removes block-log and consensus-state history below a
//! cutoff derived from `min_retain_blocks`.
//!
//! Two steps with a typed handoff: block pruning yields an `EvidenceHeight`,
//! consensus-state pruning consumes it and never deletes at or above it.

use crate::ledger::{BlockPruneOutcome, BlockStore, EvidenceHeight, StateStore};
use crate::policy::MIN_RETAIN_BLOCKS_FLOOR;
use crate::utils::{classify, PrunerError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCutoff {
    /// lowest height left in the block store
    pub base_height: u64,
    /// lowest height left in the consensus-state store; can lag the block
    /// store after an interrupted run
    pub state_base_height: u64,
    pub current_height: u64,
    pub prune_height: u64,
    /// Set once block pruning has handed over its evidence height.
    pub evidence_retain_height: Option<u64>,
}

impl HistoryCutoff {
    /// Upper bound (exclusive) for consensus-state deletion.
    pub fn state_prune_height(&self) -> u64 {
        match self.evidence_retain_height {
            Some(ev) => ev.min(self.prune_height),
            None => self.prune_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPlan {
    /// `min_retain_blocks == 0`
    Skip,
    /// Both stores are already pruned up to the cutoff.
    AlreadyPruned(HistoryCutoff),
    Prune(HistoryCutoff),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Skipped,
    AlreadyPruned(HistoryCutoff),
    Pruned { cutoff: HistoryCutoff, blocks_pruned: u64, states_pruned: u64 },
}

pub struct HistoryPruner {
    blocks: Arc<BlockStore>,
    states: Arc<StateStore>,
    min_retain_blocks: u64,
    floor: u64,
}

impl HistoryPruner {
    pub fn new(blocks: Arc<BlockStore>, states: Arc<StateStore>, min_retain_blocks: u64) -> Self {
        Self { blocks, states, min_retain_blocks, floor: MIN_RETAIN_BLOCKS_FLOOR }
    }

    pub fn with_floor(mut self, floor: u64) -> Self {
        self.floor = floor;
        self
    }

    /// Safety rail, checked before any database is touched.
    pub fn check_retention(min_retain_blocks: u64, floor: u64) -> Result<()> {
        if min_retain_blocks != 0 && min_retain_blocks < floor {
            return Err(PrunerError::RetentionTooLow { min_retain_blocks, floor });
        }
        Ok(())
    }

    /// Read the store bounds and decide what to delete. Does not mutate anything.
    pub fn plan(&self) -> Result<HistoryPlan> {
        if self.min_retain_blocks == 0 {
            return Ok(HistoryPlan::Skip);
        }
        Self::check_retention(self.min_retain_blocks, self.floor)?;

        let state = self
            .blocks
            .state()
            .map_err(|e| PrunerError::store_access(self.blocks.db().name(), e))?;
        let states_access = |e: anyhow::Error| PrunerError::store_access(self.states.db().name(), e);
        let prune_height = state.height.saturating_sub(self.min_retain_blocks);
        let cutoff = HistoryCutoff {
            base_height: state.base,
            state_base_height: self.states.base().map_err(states_access)?.unwrap_or(prune_height),
            current_height: state.height,
            prune_height,
            evidence_retain_height: None,
        };

        // consensus state at or above the evidence height is never pruned
        let evidence = self.states.evidence_params().map_err(states_access)?;
        let state_bound = evidence.map_or(prune_height, |p| p.retain_height(state.height).min(prune_height));
        if cutoff.base_height >= prune_height && cutoff.state_base_height >= state_bound {
            return Ok(HistoryPlan::AlreadyPruned(cutoff));
        }
        Ok(HistoryPlan::Prune(cutoff))
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<HistoryOutcome> {
        let plan = self.plan()?;
        self.execute(plan, cancel).await
    }

    pub async fn execute(&self, plan: HistoryPlan, cancel: &CancellationToken) -> Result<HistoryOutcome> {
        let mut cutoff = match plan {
            HistoryPlan::Skip => {
                info!("min-retain-blocks is 0, keeping all block and state history");
                return Ok(HistoryOutcome::Skipped);
            }
            HistoryPlan::AlreadyPruned(cutoff) => {
                info!(
                    base = cutoff.base_height,
                    prune_height = cutoff.prune_height,
                    "block store already pruned to the retention window"
                );
                return Ok(HistoryOutcome::AlreadyPruned(cutoff));
            }
            HistoryPlan::Prune(cutoff) => cutoff,
        };

        let blocks = self.prune_block_log(cutoff, cancel).await?;
        cutoff.evidence_retain_height = Some(blocks.evidence_height.0);

        let states_pruned = self.prune_consensus_state(cutoff, blocks.evidence_height, cancel).await?;

        Ok(HistoryOutcome::Pruned { cutoff, blocks_pruned: blocks.pruned, states_pruned })
    }

    async fn prune_block_log(&self, cutoff: HistoryCutoff, cancel: &CancellationToken) -> Result<BlockPruneOutcome> {
        let evidence = self
            .states
            .evidence_params()
            .map_err(|e| PrunerError::store_access(self.states.db().name(), e))?;
        info!(
            base = cutoff.base_height,
            height = cutoff.current_height,
            prune_height = cutoff.prune_height,
            evidence_max_age = evidence.map(|p| p.max_age_num_blocks),
            "pruning block store"
        );

        let blocks = self.blocks.clone();
        let token = cancel.clone();
        let out = tokio::task::spawn_blocking(move || {
            blocks.prune_blocks(cutoff.prune_height, evidence.as_ref(), &token)
        })
        .await
        .map_err(|e| PrunerError::HistoryPrune { stage: "block store", cause: e.to_string() })?
        .map_err(|e| classify(e, |cause| PrunerError::HistoryPrune { stage: "block store", cause }))?;

        info!(pruned = out.pruned, evidence_height = out.evidence_height.0, "block store pruned");
        Ok(out)
    }

    async fn prune_consensus_state(
        &self,
        cutoff: HistoryCutoff,
        evidence: EvidenceHeight,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let from = cutoff.state_base_height;
        let to = cutoff.state_prune_height();
        info!(from, to, evidence_height = evidence.0, "pruning state store");

        let states = self.states.clone();
        let token = cancel.clone();
        let pruned = tokio::task::spawn_blocking(move || states.prune_states(from, to, &token))
            .await
            .map_err(|e| PrunerError::HistoryPrune { stage: "state store", cause: e.to_string() })?
            .map_err(|e| classify(e, |cause| PrunerError::HistoryPrune { stage: "state store", cause }))?;

        info!(pruned, "state store pruned");
        Ok(pruned)
    }
}
