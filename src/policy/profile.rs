//! Retention profiles: named bundles of default retention parameters.
//!
//! The table follows the latest profile generation: no profile samples old
//! versions (`keep_every_interval` is always 0) and the history safety floor
//! is 100000 blocks. `--pruning-keep-every` is still honoured as an explicit
//! override.

use crate::utils::{PrunerError, Result};
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fmt;

/// Profile name that takes every parameter from explicit overrides.
pub const CUSTOM_PROFILE: &str = "custom";

/// Profile used when neither a flag nor the config file names one.
pub const DEFAULT_PROFILE: &str = "default";

/// Smallest non-zero `min_retain_blocks` accepted for history pruning.
pub const MIN_RETAIN_BLOCKS_FLOOR: u64 = 100_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionProfile {
    pub name: String,
    /// 0 keeps all block/consensus-state history.
    pub min_retain_blocks: u64,
    /// 0 prunes every version.
    pub keep_recent_versions: u64,
    /// 0 disables sparse retention of every Nth old version.
    pub keep_every_interval: u64,
}

impl RetentionProfile {
    fn builtin(name: &str, min_retain_blocks: u64, keep_recent_versions: u64) -> Self {
        Self { name: name.to_string(), min_retain_blocks, keep_recent_versions, keep_every_interval: 0 }
    }

    /// Sampling interval, `None` when disabled.
    pub fn keep_every(&self) -> Option<u64> {
        (self.keep_every_interval > 0).then_some(self.keep_every_interval)
    }

    pub fn prunes_history(&self) -> bool {
        self.min_retain_blocks > 0
    }
}

impl Default for RetentionProfile {
    fn default() -> Self {
        Self::builtin(DEFAULT_PROFILE, 0, 400_000)
    }
}

impl fmt::Display for RetentionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (min-retain-blocks={}, pruning-keep-recent={}, pruning-keep-every={})",
            self.name, self.min_retain_blocks, self.keep_recent_versions, self.keep_every_interval
        )
    }
}

lazy_static! {
    static ref PROFILES: BTreeMap<&'static str, RetentionProfile> = {
        let mut m = BTreeMap::new();
        // (name, min-retain-blocks, pruning-keep-recent)
        for (name, blocks, recent) in [
            ("nothing", 0, 0),
            ("everything", 0, 10),
            ("rest-light", 600_000, 100_000),
            ("sentry", 300_000, 100),
        ] {
            m.insert(name, RetentionProfile::builtin(name, blocks, recent));
        }
        m.insert(DEFAULT_PROFILE, RetentionProfile::default());
        m
    };
}

/// Names of the built-in profiles, sorted.
pub fn profile_names() -> Vec<&'static str> {
    PROFILES.keys().copied().collect()
}

/// Explicit per-field values that take precedence over a named profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionOverrides {
    pub min_retain_blocks: Option<u64>,
    pub keep_recent_versions: Option<u64>,
    pub keep_every_interval: Option<u64>,
}

impl RetentionOverrides {
    /// Field-by-field merge; values in `self` win over `lower`.
    pub fn or(self, lower: RetentionOverrides) -> RetentionOverrides {
        RetentionOverrides {
            min_retain_blocks: self.min_retain_blocks.or(lower.min_retain_blocks),
            keep_recent_versions: self.keep_recent_versions.or(lower.keep_recent_versions),
            keep_every_interval: self.keep_every_interval.or(lower.keep_every_interval),
        }
    }
}

/// Resolve a profile name plus overrides into a fully populated profile.
pub fn resolve_profile(name: &str, overrides: RetentionOverrides) -> Result<RetentionProfile> {
    if name == CUSTOM_PROFILE {
        let missing = |field: &'static str| PrunerError::MissingOverride { profile: name.to_string(), field };
        return Ok(RetentionProfile {
            name: name.to_string(),
            min_retain_blocks: overrides.min_retain_blocks.ok_or_else(|| missing("min-retain-blocks"))?,
            keep_recent_versions: overrides.keep_recent_versions.ok_or_else(|| missing("pruning-keep-recent"))?,
            keep_every_interval: overrides.keep_every_interval.ok_or_else(|| missing("pruning-keep-every"))?,
        });
    }

    let base = PROFILES.get(name).ok_or_else(|| PrunerError::InvalidProfile(name.to_string()))?;
    Ok(RetentionProfile {
        name: base.name.clone(),
        min_retain_blocks: overrides.min_retain_blocks.unwrap_or(base.min_retain_blocks),
        keep_recent_versions: overrides.keep_recent_versions.unwrap_or(base.keep_recent_versions),
        keep_every_interval: overrides.keep_every_interval.unwrap_or(base.keep_every_interval),
    })
}
