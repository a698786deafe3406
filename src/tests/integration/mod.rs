//! Integration tests: seed an on-disk node home, run the commands, check the databases.

use crate::cli::config::{config_path, load_run_config};
use crate::cli::Flags;
use crate::ledger::{HistoryOutcome, Ledger};
use crate::policy::PartitionKey;
use crate::pruning::{Orchestrator, RunConfig};
use crate::state::{MultiStore, VersionedStore};
use crate::storage::{db_path, FsKvStore, KvStore, APPLICATION_DB, BLOCKSTORE_DB, STATE_DB};
use crate::utils::PrunerError;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const MODULES: &[&str] = &["acc", "bank", "oracle"];

/// Node home with `heights` committed versions and blocks.
fn seed_home(heights: u64) -> TempDir {
    let home = tempfile::tempdir().unwrap();
    let data = home.path().join("data");
    let app: Arc<dyn KvStore> = Arc::new(FsKvStore::create(db_path(&data, APPLICATION_DB)).unwrap());
    let blocks: Arc<dyn KvStore> = Arc::new(FsKvStore::create(db_path(&data, BLOCKSTORE_DB)).unwrap());
    let states: Arc<dyn KvStore> = Arc::new(FsKvStore::create(db_path(&data, STATE_DB)).unwrap());

    let ms = MultiStore::new(app);
    let ledger = Ledger::new(blocks, states);
    for h in 1..=heights {
        let writes: Vec<_> = MODULES
            .iter()
            .map(|m| (PartitionKey::new(*m), vec![(b"balance".to_vec(), h.to_le_bytes().to_vec())]))
            .collect();
        ms.commit(h, &writes).unwrap();
        ledger.blocks.save_block([h as u8; 32], &[vec![7; 16], vec![8; 16]], b"commit").unwrap();
        ledger.states.save_height(h, b"vals", b"params", b"abci").unwrap();
    }
    home
}

fn write_app_toml(home: &Path, body: &str) {
    fs::create_dir_all(home.join("config")).unwrap();
    fs::write(config_path(home), body).unwrap();
}

fn flags(home: &Path) -> Flags {
    Flags {
        home: Some(home.to_path_buf()),
        backend: Some("fs".into()),
        modules: vec!["oracle".into()],
        ..Flags::default()
    }
}

fn reopen(home: &Path) -> (MultiStore, Ledger) {
    let data = home.join("data");
    let app: Arc<dyn KvStore> = Arc::new(FsKvStore::open(db_path(&data, APPLICATION_DB)).unwrap());
    let blocks: Arc<dyn KvStore> = Arc::new(FsKvStore::open(db_path(&data, BLOCKSTORE_DB)).unwrap());
    let states: Arc<dyn KvStore> = Arc::new(FsKvStore::open(db_path(&data, STATE_DB)).unwrap());
    (MultiStore::new(app), Ledger::new(blocks, states))
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

/// Resolved config with the history floor lowered so a small seeded chain can be pruned.
fn small_chain_config(home: &Path) -> RunConfig {
    let mut cfg = load_run_config(&flags(home)).unwrap();
    cfg.history_floor = 5;
    cfg
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prune_from_app_toml_then_compact() {
    let home = seed_home(30);
    write_app_toml(
        home.path(),
        "pruning = \"custom\"\nmin-retain-blocks = \"10\"\npruning-keep-recent = \"5\"\npruning-keep-every = \"0\"\nparallel-limit = 2\nbatch = 3\n",
    );
    let stray = db_path(&home.path().join("data"), APPLICATION_DB).join("00ff.tmp");
    fs::write(&stray, b"partial write").unwrap();

    let cfg = small_chain_config(home.path());
    // core stores plus the default bandchain extension, which already holds oracle
    assert_eq!(cfg.partitions.len(), 17);
    let report = Orchestrator::new(cfg).prune(&CancellationToken::new()).await.unwrap();

    assert!(matches!(report.history, Some(HistoryOutcome::Pruned { blocks_pruned: 19, states_pruned: 19, .. })));
    assert_eq!(report.pool.as_ref().unwrap().versions_pruned(), 3 * 25);
    assert_eq!(report.compaction.compacted.len(), 3);
    assert!(!stray.exists());

    let (ms, ledger) = reopen(home.path());
    for m in MODULES {
        let versions = ms.mount_partition(&PartitionKey::new(*m)).unwrap().versions().unwrap();
        assert_eq!(versions, (26..=30).collect::<Vec<_>>());
    }
    assert_eq!(ledger.blocks.base().unwrap(), 20);
    assert_eq!(ledger.blocks.height().unwrap(), 30);
    assert!(ledger.blocks.load_block_meta(19).unwrap().is_none());
    assert!(ledger.blocks.load_block_meta(20).unwrap().is_some());
    assert!(!ledger.states.has_height(19).unwrap());
    assert!(ledger.states.has_height(20).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_prune_changes_nothing() {
    let home = seed_home(20);
    let mut f = flags(home.path());
    f.pruning = Some("custom".into());
    f.min_retain_blocks = Some(8);
    f.pruning_keep_recent = Some(4);
    f.pruning_keep_every = Some(3);

    let mut cfg = load_run_config(&f).unwrap();
    cfg.history_floor = 5;
    let orch = Orchestrator::new(cfg);
    let first = orch.prune(&CancellationToken::new()).await.unwrap();
    // 1..=16 minus multiples of 3
    assert_eq!(first.pool.unwrap().versions_pruned(), 3 * 11);

    let data = home.path().join("data");
    let before = file_count(&db_path(&data, APPLICATION_DB));
    let again = orch.prune(&CancellationToken::new()).await.unwrap();

    assert_eq!(again.pool.unwrap().versions_pruned(), 0);
    assert!(matches!(again.history, Some(HistoryOutcome::AlreadyPruned(c)) if c.base_height == 12));
    assert_eq!(file_count(&db_path(&data, APPLICATION_DB)), before);
}

#[tokio::test]
async fn retention_below_floor_leaves_every_database_untouched() {
    let home = seed_home(6);
    let mut f = flags(home.path());
    f.min_retain_blocks = Some(50_000);
    let data = home.path().join("data");
    let counts: Vec<usize> =
        [APPLICATION_DB, BLOCKSTORE_DB, STATE_DB].iter().map(|n| file_count(&db_path(&data, n))).collect();

    let cfg = load_run_config(&f).unwrap();
    let err = Orchestrator::new(cfg).prune(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err, PrunerError::RetentionTooLow { min_retain_blocks: 50_000, floor: 100_000 });
    let after: Vec<usize> =
        [APPLICATION_DB, BLOCKSTORE_DB, STATE_DB].iter().map(|n| file_count(&db_path(&data, n))).collect();
    assert_eq!(after, counts);
}

#[tokio::test]
async fn compact_only_touches_databases_in_scope() {
    let home = seed_home(3);
    let data = home.path().join("data");
    let app_tmp = db_path(&data, APPLICATION_DB).join("aa.tmp");
    let block_tmp = db_path(&data, BLOCKSTORE_DB).join("bb.tmp");
    fs::write(&app_tmp, b"x").unwrap();
    fs::write(&block_tmp, b"x").unwrap();

    let mut f = flags(home.path());
    f.tendermint = Some(false);
    let report = Orchestrator::new(load_run_config(&f).unwrap()).compact(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.compacted.len(), 1);
    assert_eq!(report.compacted[0].0, "application");
    assert!(!app_tmp.exists());
    assert!(block_tmp.exists());
}

#[tokio::test]
async fn missing_database_fails_before_pruning_anything() {
    let home = seed_home(3);
    let data = home.path().join("data");
    fs::remove_dir_all(db_path(&data, STATE_DB)).unwrap();
    let before = file_count(&db_path(&data, APPLICATION_DB));

    let cfg = load_run_config(&flags(home.path())).unwrap();
    let err = Orchestrator::new(cfg).prune(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PrunerError::StoreAccess { ref store, .. } if store == "state"));
    assert!(!db_path(&data, STATE_DB).exists());
    assert_eq!(file_count(&db_path(&data, APPLICATION_DB)), before);
}

#[tokio::test]
async fn cancelled_before_start_reports_cancelled() {
    let home = seed_home(4);
    let mut f = flags(home.path());
    f.pruning = Some("nothing".into());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Orchestrator::new(load_run_config(&f).unwrap()).prune(&cancel).await.unwrap_err();

    assert_eq!(err, PrunerError::Cancelled);
    let (ms, _) = reopen(home.path());
    assert_eq!(ms.mount_partition(&PartitionKey::new("acc")).unwrap().versions().unwrap().len(), 4);
}
