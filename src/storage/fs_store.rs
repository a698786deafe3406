use crate::storage::traits::{BatchOp, KvIter, KvStore, WriteBatch};
use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const TMP_SUFFIX: &str = ".tmp";

/// File-per-key engine. Each key is a file named by the hex of the key.
///
/// Writes go to a temp file that is renamed into place, so a crash leaves at
/// most a stray `.tmp` file behind; `compact` sweeps those.
pub struct FsKvStore {
    name: String,
    dir: PathBuf,
}

impl FsKvStore {
    /// Open an existing database directory. Never creates one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        if !dir.is_dir() {
            bail!("database directory {} does not exist", dir.display());
        }
        let name = dir
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "fs".into());
        Ok(Self { name, dir })
    }

    /// Create the directory first. Used when seeding databases in tests and tooling.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(path.as_ref())?;
        Self::open(path)
    }

    fn key_path(&self, key: &[u8]) -> PathBuf {
        self.dir.join(hex::encode(key))
    }

    fn read_file(path: &Path) -> Result<Vec<u8>> {
        let mut f = OpenOptions::new().read(true).open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl KvStore for FsKvStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let p = self.key_path(key);
        let tmp = p.with_extension(&TMP_SUFFIX[1..]);
        let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp)?;
        f.write_all(value)?;
        f.sync_data()?;
        fs::rename(&tmp, &p)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let p = self.key_path(key);
        if !p.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_file(&p)?))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let p = self.key_path(key);
        match fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", p.display())),
        }
    }

    // not atomic: ops are applied in order
    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => self.put(&k, &v)?,
                BatchOp::Delete(k) => self.delete(&k)?,
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter> {
        let mut items = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().unwrap_or_default();
            let key = match hex::decode(&name) {
                Ok(k) => k,
                Err(_) => continue,
            };
            if key.starts_with(prefix) {
                // deleted by a concurrent writer between read_dir and open
                match Self::read_file(&entry.path()) {
                    Ok(buf) => items.push((key, buf)),
                    Err(_) if !entry.path().exists() => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(KvIter { items })
    }

    fn compact(&self) -> Result<()> {
        let mut swept = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().unwrap_or_default();
            if name.ends_with(TMP_SUFFIX) {
                fs::remove_file(entry.path())?;
                swept += 1;
            }
        }
        debug!(store = %self.name, swept, "fs compaction swept temp files");
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }
}
