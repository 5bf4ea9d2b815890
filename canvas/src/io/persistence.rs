//! Session document persistence keyed by session key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use super::config::{CanvasConfig, PersistenceBackend};
use super::schema::validate_document;
use crate::core::types::{SessionKey, SharedState};

/// Durable storage for the last known good document of each session.
pub trait StatePersistence {
    fn get(&self, key: &SessionKey) -> Result<Option<SharedState>>;
    fn set(&self, key: &SessionKey, state: &SharedState) -> Result<()>;
}

/// One pretty-printed JSON file per session under `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl StatePersistence for FileStore {
    fn get(&self, key: &SessionKey) -> Result<Option<SharedState>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        load_state(&path).map(Some)
    }

    fn set(&self, key: &SessionKey, state: &SharedState) -> Result<()> {
        let path = self.path_for(key);
        let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }
}

/// Load a session file, checking it against the schema first.
pub fn load_state(path: &Path) -> Result<SharedState> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    validate_document(&value).with_context(|| format!("validate state {}", path.display()))?;
    serde_json::from_value(value).with_context(|| format!("deserialize state {}", path.display()))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}

/// Process-local storage; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<SessionKey, SharedState>>,
}

impl StatePersistence for MemoryStore {
    fn get(&self, key: &SessionKey) -> Result<Option<SharedState>> {
        let states = self
            .states
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(states.get(key).cloned())
    }

    fn set(&self, key: &SessionKey, state: &SharedState) -> Result<()> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        states.insert(key.clone(), state.clone());
        Ok(())
    }
}

/// Backend selected by `[persistence]` in the config.
#[derive(Debug)]
pub enum Backend {
    File(FileStore),
    Memory(MemoryStore),
}

impl Backend {
    /// Build the configured backend. Relative directories resolve against `root`.
    pub fn from_config(root: &Path, config: &CanvasConfig) -> Self {
        match config.persistence.backend {
            PersistenceBackend::File => {
                Backend::File(FileStore::new(root.join(&config.persistence.dir)))
            }
            PersistenceBackend::Memory => Backend::Memory(MemoryStore::default()),
        }
    }

    /// Directory holding session files, when the backend has one.
    pub fn dir(&self) -> Option<&Path> {
        match self {
            Backend::File(store) => Some(store.dir()),
            Backend::Memory(_) => None,
        }
    }
}

impl StatePersistence for Backend {
    fn get(&self, key: &SessionKey) -> Result<Option<SharedState>> {
        match self {
            Backend::File(store) => store.get(key),
            Backend::Memory(store) => store.get(key),
        }
    }

    fn set(&self, key: &SessionKey, state: &SharedState) -> Result<()> {
        match self {
            Backend::File(store) => store.set(key, state),
            Backend::Memory(store) => store.set(key, state),
        }
    }
}
