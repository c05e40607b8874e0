//! Durable store for the autosave configuration.
//!
//! The configuration lives under the `gitAutoSave` key of a larger portfolio
//! JSON document. Every other key is opaque here and is carried through
//! saves untouched. Saves are whole-document read-modify-write, serialized
//! within the process; a concurrent external writer can lose updates (last
//! write wins).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::commit_message::iso_timestamp;
use crate::core::config::{AutosaveConfig, normalize};

pub const AUTOSAVE_KEY: &str = "gitAutoSave";
pub const UPDATED_AT_KEY: &str = "updatedAt";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    /// Held across each read-modify-write; shared by clones.
    writes: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document.
    ///
    /// A missing file, bytes that are not JSON (including invalid UTF-8), or a
    /// non-object top level all yield an empty document. Other read failures
    /// are errors.
    pub fn load_document(&self) -> Result<Map<String, Value>> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "store missing; using defaults");
                return Ok(Map::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.path.display()));
            }
        };
        match serde_json::from_slice::<Value>(&contents) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => {
                warn!(path = %self.path.display(), "store is not a JSON object; using defaults");
                Ok(Map::new())
            }
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "store is corrupt; using defaults");
                Ok(Map::new())
            }
        }
    }

    /// Load the normalized autosave configuration.
    pub fn load(&self) -> Result<AutosaveConfig> {
        let document = self.load_document()?;
        Ok(normalize(
            document.get(AUTOSAVE_KEY).unwrap_or(&Value::Null),
        ))
    }

    /// Persist `config`, stamping the document's `updatedAt`.
    ///
    /// The config is normalized before writing so the file always holds the
    /// steady-state shape. Returns what was written.
    pub fn save(&self, config: &AutosaveConfig) -> Result<AutosaveConfig> {
        let _writing = self.lock_writes();
        self.write_config(config)
    }

    /// Reload, apply `edit`, and save.
    pub fn update_autosave<F>(&self, edit: F) -> Result<AutosaveConfig>
    where
        F: FnOnce(&mut AutosaveConfig),
    {
        let _writing = self.lock_writes();
        let mut config = self.load()?;
        edit(&mut config);
        self.write_config(&config)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_config(&self, config: &AutosaveConfig) -> Result<AutosaveConfig> {
        let normalized = normalize(&config.to_value());
        let mut document = self.load_document()?;
        document.insert(AUTOSAVE_KEY.to_string(), normalized.to_value());
        document.insert(
            UPDATED_AT_KEY.to_string(),
            Value::String(iso_timestamp(Utc::now())),
        );
        let mut buf = serde_json::to_string_pretty(&Value::Object(document))
            .context("serialize store document")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)?;
        debug!(path = %self.path.display(), "store saved");
        Ok(normalized)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp store in {}", parent.display()))?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .with_context(|| format!("copy permissions of {}", path.display()))?;
    }
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp store {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace store {}", path.display()))?;
    Ok(())
}
