//! Randomized tests for config parsing and prune-set selection.

use crate::cli::config::FileConfig;
use crate::pruning::prune_set;
use rand::Rng;
use std::collections::BTreeSet;

#[test]
fn fuzz_app_toml_parsing() {
    let mut rng = rand::thread_rng();
    let keys = ["pruning", "min-retain-blocks", "pruning-keep-recent", "batch", "modules", "cosmos-sdk"];
    let values = ["\"\"", "\"12\"", "-3", "7", "true", "\"x,y\"", "[1, 2]", "{ a = 1 }", "\"\u{0}\""];

    for _ in 0..1000 {
        let mut doc = String::new();
        for _ in 0..rng.gen_range(0..5) {
            let k = keys[rng.gen_range(0..keys.len())];
            let v = values[rng.gen_range(0..values.len())];
            doc.push_str(&format!("{k} = {v}\n"));
        }
        // duplicate keys and mistyped values must be errors, never panics
        let _ = toml::from_str::<FileConfig>(&doc);
    }

    for _ in 0..500 {
        let bogus: Vec<u8> = (0..64).map(|_| rng.gen()).collect();
        let _ = toml::from_str::<FileConfig>(&String::from_utf8_lossy(&bogus));
    }
}

/// Straight-line selection used as the reference for random inputs.
fn reference(versions: &[u64], keep_recent: u64, keep_every: Option<u64>) -> Vec<u64> {
    let Some(&latest) = versions.last() else { return vec![] };
    if keep_recent > latest {
        return vec![];
    }
    let recent: BTreeSet<u64> = versions.iter().rev().take(keep_recent as usize).copied().collect();
    versions
        .iter()
        .copied()
        .filter(|v| !recent.contains(v) && *v <= latest - keep_recent)
        .filter(|v| !matches!(keep_every, Some(m) if m > 0 && v % m == 0))
        .collect()
}

#[test]
fn fuzz_prune_set_against_reference() {
    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let set: BTreeSet<u64> = (0..rng.gen_range(0..60)).map(|_| rng.gen_range(1..400)).collect();
        let versions: Vec<u64> = set.into_iter().collect();
        let keep_recent = rng.gen_range(0..80);
        let keep_every = if rng.gen_bool(0.5) { Some(rng.gen_range(0..20)) } else { None };

        assert_eq!(
            prune_set(&versions, keep_recent, keep_every),
            reference(&versions, keep_recent, keep_every),
            "versions={versions:?} keep_recent={keep_recent} keep_every={keep_every:?}"
        );
    }
}
