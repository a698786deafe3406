use crate::ledger::{EvidenceParams, PRUNE_BATCH_HEIGHTS};
use crate::storage::{KvStore, WriteBatch};
use crate::utils::Interrupted;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const EVIDENCE_PARAMS_KEY: &[u8] = b"evidenceParams";

const VALIDATORS_PREFIX: &str = "validatorsKey:";

fn validators_key(h: u64) -> Vec<u8> {
    format!("{VALIDATORS_PREFIX}{h}").into_bytes()
}

fn params_key(h: u64) -> Vec<u8> {
    format!("consensusParamsKey:{h}").into_bytes()
}

fn abci_key(h: u64) -> Vec<u8> {
    format!("abciResponsesKey:{h}").into_bytes()
}

/// Consensus-state log: validator sets, consensus params and ABCI responses per height.
pub struct StateStore {
    db: Arc<dyn KvStore>,
}

impl StateStore {
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<dyn KvStore> {
        &self.db
    }

    pub fn evidence_params(&self) -> Result<Option<EvidenceParams>> {
        match self.db.get(EVIDENCE_PARAMS_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).context("decoding evidence params")?)),
            None => Ok(None),
        }
    }

    pub fn save_evidence_params(&self, params: &EvidenceParams) -> Result<()> {
        self.db.put(EVIDENCE_PARAMS_KEY, &bincode::serialize(params)?)
    }

    /// Record the state written at `height`. Used to build node databases for tests and tooling.
    pub fn save_height(&self, height: u64, validators: &[u8], params: &[u8], abci: &[u8]) -> Result<()> {
        let mut wb = WriteBatch::new();
        wb.put(validators_key(height), validators.to_vec());
        wb.put(params_key(height), params.to_vec());
        wb.put(abci_key(height), abci.to_vec());
        self.db.write_batch(wb)
    }

    pub fn has_height(&self, height: u64) -> Result<bool> {
        self.db.exists(&validators_key(height))
    }

    /// Lowest height still holding a validator set, `None` when the store is empty.
    ///
    /// Heights are written in decimal, so keys do not sort numerically and the
    /// whole prefix is scanned.
    pub fn base(&self) -> Result<Option<u64>> {
        let mut base: Option<u64> = None;
        for key in self.db.scan_prefix(VALIDATORS_PREFIX.as_bytes())?.keys() {
            let height = std::str::from_utf8(&key[VALIDATORS_PREFIX.len()..])
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .with_context(|| format!("malformed validators key {}", hex::encode(&key)))?;
            base = Some(base.map_or(height, |b| b.min(height)));
        }
        Ok(base)
    }

    /// Delete every record in `[from, to)`. Returns the number of heights that held a validator set.
    pub fn prune_states(&self, from: u64, to: u64, cancel: &CancellationToken) -> Result<u64> {
        let mut pruned = 0u64;
        let mut h = from;
        while h < to {
            if cancel.is_cancelled() {
                return Err(Interrupted.into());
            }
            let end = (h + PRUNE_BATCH_HEIGHTS).min(to);
            let mut wb = WriteBatch::new();
            for height in h..end {
                if self.has_height(height)? {
                    pruned += 1;
                }
                wb.delete(validators_key(height));
                wb.delete(params_key(height));
                wb.delete(abci_key(height));
            }
            self.db.write_batch(wb).with_context(|| format!("pruning states {h}..{end}"))?;
            debug!(from = h, to = end, pruned, "pruned state batch");
            h = end;
        }
        Ok(pruned)
    }
}
