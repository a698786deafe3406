use crate::ledger::{EvidenceHeight, EvidenceParams, PRUNE_BATCH_HEIGHTS};
use crate::storage::{KvStore, WriteBatch};
use crate::utils::Interrupted;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const STATE_KEY: &[u8] = b"blockStore";

fn meta_key(h: u64) -> Vec<u8> {
    format!("H:{h}").into_bytes()
}

fn part_key(h: u64, i: u32) -> Vec<u8> {
    format!("P:{h}:{i}").into_bytes()
}

fn commit_key(h: u64) -> Vec<u8> {
    format!("C:{h}").into_bytes()
}

fn seen_commit_key(h: u64) -> Vec<u8> {
    format!("SC:{h}").into_bytes()
}

fn hash_key(hash: &[u8; 32]) -> Vec<u8> {
    format!("BH:{}", hex::encode(hash)).into_bytes()
}

/// Retained height range of the block log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockStoreState {
    pub base: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockMeta {
    pub height: u64,
    pub hash: [u8; 32],
    pub num_parts: u32,
}

/// Result of pruning the block log, handed to consensus-state pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPruneOutcome {
    /// block headers removed; headers kept for unexpired evidence are not counted
    pub pruned: u64,
    pub evidence_height: EvidenceHeight,
}

/// Block log: block meta, parts, commits and seen commits per height.
pub struct BlockStore {
    db: Arc<dyn KvStore>,
}

impl BlockStore {
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<dyn KvStore> {
        &self.db
    }

    pub fn state(&self) -> Result<BlockStoreState> {
        match self.db.get(STATE_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes).context("decoding block store state"),
            None => Ok(BlockStoreState::default()),
        }
    }

    pub fn base(&self) -> Result<u64> {
        Ok(self.state()?.base)
    }

    pub fn height(&self) -> Result<u64> {
        Ok(self.state()?.height)
    }

    pub fn load_block_meta(&self, height: u64) -> Result<Option<BlockMeta>> {
        match self.db.get(&meta_key(height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).with_context(|| format!("block meta {height}"))?)),
            None => Ok(None),
        }
    }

    pub fn has_commit(&self, height: u64) -> Result<bool> {
        self.db.exists(&commit_key(height))
    }

    pub fn has_seen_commit(&self, height: u64) -> Result<bool> {
        self.db.exists(&seen_commit_key(height))
    }

    /// Append the next block. Used to build node databases for tests and tooling.
    pub fn save_block(&self, hash: [u8; 32], parts: &[Vec<u8>], commit: &[u8]) -> Result<u64> {
        let mut state = self.state()?;
        let height = state.height + 1;
        let meta = BlockMeta { height, hash, num_parts: parts.len() as u32 };

        let mut wb = WriteBatch::new();
        wb.put(meta_key(height), bincode::serialize(&meta)?);
        wb.put(hash_key(&hash), height.to_be_bytes().to_vec());
        for (i, part) in parts.iter().enumerate() {
            wb.put(part_key(height, i as u32), part.clone());
        }
        wb.put(commit_key(height), commit.to_vec());
        wb.put(seen_commit_key(height), commit.to_vec());
        if state.base == 0 {
            state.base = height;
        }
        state.height = height;
        wb.put(STATE_KEY.to_vec(), bincode::serialize(&state)?);
        self.db.write_batch(wb)?;
        Ok(height)
    }

    /// Remove blocks below `retain_height` and advance the base to it.
    ///
    /// Headers, hashes and commits of heights whose evidence has not expired
    /// are kept; the lowest such height is returned as the evidence height.
    /// Parts and seen commits below `retain_height` are always removed.
    pub fn prune_blocks(
        &self,
        retain_height: u64,
        evidence: Option<&EvidenceParams>,
        cancel: &CancellationToken,
    ) -> Result<BlockPruneOutcome> {
        let mut state = self.state()?;
        if retain_height == 0 {
            bail!("retain height must be greater than 0");
        }
        if retain_height > state.height {
            bail!("retain height {retain_height} is above block store height {}", state.height);
        }
        if retain_height <= state.base {
            // nothing left to delete, the evidence bound still applies to consensus state
            let evidence_height = evidence.map_or(retain_height, |p| p.retain_height(state.height).min(retain_height));
            return Ok(BlockPruneOutcome { pruned: 0, evidence_height: EvidenceHeight(evidence_height) });
        }

        let mut evidence_point = retain_height;
        let mut pruned = 0u64;
        let mut h = state.base;
        while h < retain_height {
            if cancel.is_cancelled() {
                return Err(Interrupted.into());
            }
            let end = (h + PRUNE_BATCH_HEIGHTS).min(retain_height);
            let mut wb = WriteBatch::new();
            for height in h..end {
                let meta = self.load_block_meta(height)?;
                if evidence_point == retain_height
                    && evidence.map_or(false, |p| !p.is_expired(height, state.height))
                {
                    evidence_point = height;
                }
                if height < evidence_point {
                    wb.delete(meta_key(height));
                    wb.delete(commit_key(height));
                    if let Some(m) = &meta {
                        wb.delete(hash_key(&m.hash));
                        pruned += 1;
                    }
                }
                wb.delete(seen_commit_key(height));
                match &meta {
                    Some(m) => {
                        for i in 0..m.num_parts {
                            wb.delete(part_key(height, i));
                        }
                    }
                    None => {
                        for k in self.db.scan_prefix(format!("P:{height}:").as_bytes())?.keys() {
                            wb.delete(k);
                        }
                    }
                }
            }
            state.base = end;
            wb.put(STATE_KEY.to_vec(), bincode::serialize(&state)?);
            self.db.write_batch(wb).with_context(|| format!("pruning blocks {h}..{end}"))?;
            debug!(from = h, to = end, pruned, "pruned block batch");
            h = end;
        }

        Ok(BlockPruneOutcome { pruned, evidence_height: EvidenceHeight(evidence_point) })
    }
}
