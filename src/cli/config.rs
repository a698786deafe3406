use crate::cli::Flags;
use crate::policy::{resolve_partitions, resolve_profile, RetentionOverrides, DEFAULT_PROFILE, MIN_RETAIN_BLOCKS_FLOOR};
use crate::pruning::RunConfig;
use crate::storage::StorageEngine;
use crate::utils::serde_helpers::{lenient_u64, non_empty_string};
use crate::utils::{PrunerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_HOME_DIR: &str = ".band";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BATCH: u64 = 100_000;
pub const DEFAULT_PARALLEL_LIMIT: u64 = 16;
pub const DEFAULT_APP: &str = "bandchain";
/// `--app` value that prunes the core module stores only.
pub const NO_APP: &str = "none";

/// `<home>/config/app.toml`. Every key is optional; unknown keys and tables
/// are ignored so the node's own app.toml can be read as is.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    #[serde(default, deserialize_with = "non_empty_string")]
    pub pruning: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub min_retain_blocks: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub pruning_keep_recent: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub pruning_keep_every: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub batch: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub parallel_limit: Option<u64>,
    /// comma separated
    #[serde(default, deserialize_with = "non_empty_string")]
    pub modules: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub app: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub backend: Option<String>,
    #[serde(default)]
    pub cosmos_sdk: Option<bool>,
    #[serde(default)]
    pub tendermint: Option<bool>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: FileConfig = toml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load the home's app.toml, or an empty config when the file is absent.
    pub fn load_from_home(home: &Path) -> Result<Self> {
        let path = config_path(home);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using flags and profile defaults");
            return Ok(Self::default());
        }
        let cfg = Self::load(&path).map_err(|e| PrunerError::Config(format!("reading {}: {e:#}", path.display())))?;
        info!(path = %path.display(), "loaded config file");
        Ok(cfg)
    }

    fn overrides(&self) -> RetentionOverrides {
        RetentionOverrides {
            min_retain_blocks: self.min_retain_blocks,
            keep_recent_versions: self.pruning_keep_recent,
            keep_every_interval: self.pruning_keep_every,
        }
    }
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config").join("app.toml")
}

pub fn default_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default().join(DEFAULT_HOME_DIR)
}

/// Parse a CSV list into trimmed, non-empty names.
pub fn parse_csv(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

fn to_usize(value: u64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| PrunerError::Config(format!("{field} {value} is out of range")))
}

/// Merge flags over the config file over profile defaults into one immutable run config.
pub fn resolve(flags: &Flags, file: &FileConfig) -> Result<RunConfig> {
    let home = flags.home.clone().unwrap_or_else(default_home);
    let data_dir = flags.data_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let data_dir = if data_dir.is_absolute() { data_dir } else { home.join(data_dir) };

    let backend = match flags.backend.as_deref().or(file.backend.as_deref()) {
        Some(s) => s.parse::<StorageEngine>().map_err(|e| PrunerError::Config(format!("{e:#}")))?,
        None => StorageEngine::default(),
    };

    let profile_name = flags.pruning.as_deref().or(file.pruning.as_deref()).unwrap_or(DEFAULT_PROFILE);
    let profile = resolve_profile(profile_name, flags.overrides().or(file.overrides()))?;

    let batch = to_usize(flags.batch.or(file.batch).unwrap_or(DEFAULT_BATCH), "batch")?;
    let parallel_limit =
        to_usize(flags.parallel_limit.or(file.parallel_limit).unwrap_or(DEFAULT_PARALLEL_LIMIT), "parallel-limit")?;

    let modules = if flags.modules.is_empty() {
        file.modules.as_deref().map(parse_csv).unwrap_or_default()
    } else {
        flags.modules.clone()
    };
    let app = flags
        .app
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .or(file.app.as_deref().map(str::trim))
        .unwrap_or(DEFAULT_APP);
    let app = if app.eq_ignore_ascii_case(NO_APP) { None } else { Some(app) };
    let partitions = resolve_partitions(app, &modules)?;

    Ok(RunConfig {
        home,
        data_dir,
        backend,
        profile,
        batch,
        parallel_limit,
        partitions,
        cosmos_sdk: flags.cosmos_sdk.or(file.cosmos_sdk).unwrap_or(true),
        tendermint: flags.tendermint.or(file.tendermint).unwrap_or(true),
        history_floor: MIN_RETAIN_BLOCKS_FLOOR,
    })
}

/// Read `<home>/config/app.toml` (if any) and resolve the run config.
pub fn load_run_config(flags: &Flags) -> Result<RunConfig> {
    let home = flags.home.clone().unwrap_or_else(default_home);
    let file = FileConfig::load_from_home(&home)?;
    resolve(flags, &file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PartitionKey;

    fn flags(home: &Path) -> Flags {
        Flags { home: Some(home.to_path_buf()), ..Flags::default() }
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let cfg = resolve(&flags(Path::new("/n")), &FileConfig::default()).unwrap();
        assert_eq!(cfg.profile.name, "default");
        assert_eq!(cfg.profile.keep_recent_versions, 400_000);
        assert_eq!(cfg.batch, 100_000);
        assert_eq!(cfg.parallel_limit, 16);
        // core stores plus the bandchain extension
        assert_eq!(cfg.partitions.len(), 17);
        assert_eq!(cfg.data_dir, PathBuf::from("/n/data"));
        assert!(cfg.cosmos_sdk && cfg.tendermint);
    }

    #[test]
    fn reads_node_app_toml_with_string_numbers() {
        let file: FileConfig = toml::from_str(
            r#"
            pruning = "custom"
            pruning-keep-recent = "100"
            pruning-keep-every = "0"
            min-retain-blocks = 0
            halt-height = 0

            [telemetry]
            enabled = false
            "#,
        )
        .unwrap();

        let cfg = resolve(&flags(Path::new("/n")), &file).unwrap();
        assert_eq!(cfg.profile.name, "custom");
        assert_eq!(cfg.profile.keep_recent_versions, 100);
        assert_eq!(cfg.profile.min_retain_blocks, 0);
    }

    #[test]
    fn flags_override_file_override_profile() {
        let file: FileConfig = toml::from_str(
            "pruning = \"sentry\"\npruning-keep-recent = \"500\"\nbatch = 10\nmodules = \"wasm, oracle\"",
        )
        .unwrap();
        let mut f = flags(Path::new("/n"));
        f.batch = Some(20);

        let cfg = resolve(&f, &file).unwrap();
        assert_eq!(cfg.profile.name, "sentry");
        assert_eq!(cfg.profile.min_retain_blocks, 300_000);
        assert_eq!(cfg.profile.keep_recent_versions, 500);
        assert_eq!(cfg.batch, 20);
        assert_eq!(cfg.partitions.len(), 18);

        f.pruning = Some("nothing".into());
        f.modules = vec!["wasm".into()];
        let cfg = resolve(&f, &file).unwrap();
        assert_eq!(cfg.profile.name, "nothing");
        assert_eq!(cfg.profile.keep_recent_versions, 500);
        assert_eq!(cfg.partitions.len(), 18);
    }

    #[test]
    fn app_none_prunes_core_stores_only() {
        let mut f = flags(Path::new("/n"));
        f.app = Some("none".into());
        let cfg = resolve(&f, &FileConfig::default()).unwrap();
        assert_eq!(cfg.partitions.len(), 13);
        assert!(!cfg.partitions.contains(&PartitionKey::new("oracle")));

        let file: FileConfig = toml::from_str("app = \"none\"\nmodules = \"oracle\"").unwrap();
        let cfg = resolve(&flags(Path::new("/n")), &file).unwrap();
        assert_eq!(cfg.partitions.len(), 14);

        // an explicit flag wins over the file
        f.app = Some("bandchain".into());
        assert_eq!(resolve(&f, &file).unwrap().partitions.len(), 17);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let mut f = flags(Path::new("/n"));
        f.pruning = Some("aggressive".into());
        assert_eq!(
            resolve(&f, &FileConfig::default()).unwrap_err(),
            PrunerError::InvalidProfile("aggressive".into())
        );

        let mut f = flags(Path::new("/n"));
        f.app = Some("osmosis".into());
        assert!(resolve(&f, &FileConfig::default()).unwrap_err().is_config());

        let mut f = flags(Path::new("/n"));
        f.backend = Some("goleveldb".into());
        assert!(resolve(&f, &FileConfig::default()).unwrap_err().is_config());

        let mut f = flags(Path::new("/n"));
        f.pruning = Some("custom".into());
        f.pruning_keep_recent = Some(1);
        assert!(matches!(
            resolve(&f, &FileConfig::default()),
            Err(PrunerError::MissingOverride { field: "min-retain-blocks", .. })
        ));
    }

    #[test]
    fn config_file_is_optional_but_must_parse() {
        let home = tempfile::tempdir().unwrap();
        let file = FileConfig::load_from_home(home.path()).unwrap();
        assert!(file.pruning.is_none());

        fs::create_dir_all(home.path().join("config")).unwrap();
        fs::write(config_path(home.path()), "pruning-keep-recent = \"many\"").unwrap();
        assert!(FileConfig::load_from_home(home.path()).unwrap_err().is_config());

        fs::write(config_path(home.path()), "pruning = \"everything\"\ntendermint = false").unwrap();
        let cfg = load_run_config(&flags(home.path())).unwrap();
        assert_eq!(cfg.profile.keep_recent_versions, 10);
        assert!(!cfg.tendermint);
    }

    #[test]
    fn absolute_data_dir_is_kept() {
        let mut f = flags(Path::new("/n"));
        f.data_dir = Some(PathBuf::from("/mnt/chain"));
        let cfg = resolve(&f, &FileConfig::default()).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/mnt/chain"));
    }
}
