use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use super::FortuneRecord;

/// Fortune records in a JSON object keyed `"<user>:<date>"`.
///
/// The file is re-read on every access and writes merge only the touched key
/// into whatever is on disk, so two stores on the same path do not clobber
/// each other's entries. A missing file is an empty book; an unreadable or
/// unparsable one is an error and is never overwritten.
#[derive(Debug, Clone)]
pub struct FortuneStore {
    path: PathBuf,
}

impl FortuneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(user: i64, date: &str) -> String {
        format!("{user}:{date}")
    }

    pub fn get(&self, user: i64, date: &str) -> anyhow::Result<Option<FortuneRecord>> {
        let key = Self::key(user, date);
        let Some(value) = read_json_object(&self.path)?.remove(&key) else {
            return Ok(None);
        };
        let record = serde_json::from_value(value)
            .with_context(|| format!("malformed fortune record {key} in {}", self.path.display()))?;
        Ok(Some(record))
    }

    pub fn put(&self, user: i64, date: &str, record: &FortuneRecord) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path)?;
        let snapshot = serde_json::to_value(record)?;
        let key = Self::key(user, date);
        if on_disk.get(&key) == Some(&snapshot) {
            return Ok(());
        }
        on_disk.insert(key, snapshot);
        write_json_object(&self.path, on_disk)
    }
}

fn read_json_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => bail!("{} does not hold a JSON object", path.display()),
    }
}

/// Writes next to the target and renames over it, so readers see either
/// the old file or the new one.
fn write_json_object(path: &Path, payload: Map<String, Value>) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage a write in {}", dir.display()))?;
    staged.write_all(serde_json::to_string_pretty(&Value::Object(payload))?.as_bytes())?;
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
