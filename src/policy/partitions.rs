//! Store partitions: one independently versioned sub-store per application module.

use crate::utils::{PrunerError, Result};
use lazy_static::lazy_static;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Module stores every SDK application mounts.
pub const CORE_PARTITIONS: &[&str] = &[
    "acc",
    "bank",
    "staking",
    "mint",
    "distribution",
    "slashing",
    "gov",
    "params",
    "ibc",
    "upgrade",
    "evidence",
    "transfer",
    "capability",
];

lazy_static! {
    /// Application identifier -> extra module stores that application mounts.
    static ref APP_PARTITIONS: BTreeMap<&'static str, &'static [&'static str]> = {
        let mut m: BTreeMap<&'static str, &'static [&'static str]> = BTreeMap::new();
        m.insert("bandchain", &["feegrant", "authz", "oracle", "icahost"]);
        m
    };
}

/// Name of one partition, e.g. `bank`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Applications with a registered extension list.
pub fn known_apps() -> Vec<&'static str> {
    APP_PARTITIONS.keys().copied().collect()
}

/// Build the flat, sorted, duplicate-free partition list:
/// core list, then the app extension (if any), then operator-supplied names.
pub fn resolve_partitions(app: Option<&str>, extra: &[String]) -> Result<Vec<PartitionKey>> {
    let mut names: BTreeSet<String> = CORE_PARTITIONS.iter().map(|s| s.to_string()).collect();

    if let Some(app) = app {
        let ext = APP_PARTITIONS.get(app).ok_or_else(|| {
            PrunerError::Config(format!("unknown app {app:?} (known: {})", known_apps().join(", ")))
        })?;
        names.extend(ext.iter().map(|s| s.to_string()));
    }

    for name in extra {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if name.contains('/') {
            return Err(PrunerError::Config(format!("invalid module name {name:?}")));
        }
        names.insert(name.to_string());
    }

    Ok(names.into_iter().map(PartitionKey::new).collect())
}
