//! Command line entry: flags, config file loading and the `prune` / `compact` commands.

pub mod config;

use crate::policy::RetentionOverrides;
use crate::pruning::Orchestrator;
use crate::utils::init_logging;
use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Offline pruning and compaction of a stopped node's databases.
#[derive(Parser, Debug)]
#[clap(name = "pecunovus-pruner", version)]
pub struct Cli {
    #[clap(flatten)]
    pub flags: Flags,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

/// Flags shared by every command. Unset values fall back to
/// `<home>/config/app.toml`, then to the pruning profile.
#[derive(Args, Debug, Default, Clone)]
pub struct Flags {
    /// Node home directory [default: $HOME/.band]
    #[clap(long, global = true)]
    pub home: Option<PathBuf>,

    /// Data directory, relative to home unless absolute [default: data]
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend: rocksdb, fs or memory
    #[clap(long, global = true)]
    pub backend: Option<String>,

    /// Pruning profile: default, nothing, everything, rest-light, sentry or custom
    #[clap(long, global = true)]
    pub pruning: Option<String>,

    #[clap(long, global = true)]
    pub min_retain_blocks: Option<u64>,

    #[clap(long, global = true)]
    pub pruning_keep_recent: Option<u64>,

    #[clap(long, global = true)]
    pub pruning_keep_every: Option<u64>,

    /// Max versions deleted per write
    #[clap(long, global = true)]
    pub batch: Option<u64>,

    /// Max partitions pruned at once
    #[clap(long, global = true)]
    pub parallel_limit: Option<u64>,

    /// Extra module stores, comma separated
    #[clap(long, global = true, value_delimiter = ',')]
    pub modules: Vec<String>,

    /// Application whose extra module stores are pruned too, `none` for core stores only [default: bandchain]
    #[clap(long, global = true)]
    pub app: Option<String>,

    /// Include the application store
    #[clap(long, global = true, action = ArgAction::Set)]
    pub cosmos_sdk: Option<bool>,

    /// Include the block store and consensus-state store
    #[clap(long, global = true, action = ArgAction::Set)]
    pub tendermint: Option<bool>,

    /// Log filter directive, overridden by RUST_LOG
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,
}

impl Flags {
    pub fn overrides(&self) -> RetentionOverrides {
        RetentionOverrides {
            min_retain_blocks: self.min_retain_blocks,
            keep_recent_versions: self.pruning_keep_recent,
            keep_every_interval: self.pruning_keep_every,
        }
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    /// Prune application state versions and block history, then compact
    Prune,
    /// Compact the databases without pruning
    Compact,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.flags.log_level);
    let cfg = config::load_run_config(&cli.flags)?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            token.cancel();
        }
    });

    let orch = Orchestrator::new(cfg);
    match cli.cmd {
        Cmd::Prune => {
            let report = orch.prune(&cancel).await?;
            if let Some(pool) = &report.pool {
                println!(
                    "pruned {} versions across {} module stores",
                    pool.versions_pruned(),
                    pool.partitions.len()
                );
            }
            if let Some(history) = &report.history {
                println!("block history: {history:?}");
            }
            println!("compacted {} databases", report.compaction.compacted.len());
        }
        Cmd::Compact => {
            let cfg = orch.config();
            println!("data dir: {}", cfg.data_dir.display());
            println!("cosmos-sdk: {}, tendermint: {}", cfg.cosmos_sdk, cfg.tendermint);
            let report = orch.compact(&cancel).await?;
            println!("compacted {} databases", report.compacted.len());
        }
    }
    Ok(())
}
