//! Canvas configuration stored under `.canvas/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::guard::GuardPolicy;

/// Canvas configuration (TOML).
///
/// Hand-editable; missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CanvasConfig {
    pub guard: GuardConfig,
    pub persistence: PersistenceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// How a well-formed incoming document combines with the last known good one.
    pub policy: GuardPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    /// Session file directory, relative to the project root.
    pub dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::File,
            dir: PathBuf::from(".canvas/sessions"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Buffered snapshot events per subscriber before it lags.
    pub broadcast_capacity: usize,
    /// SSE keep-alive interval.
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 64,
            keep_alive_secs: 15,
        }
    }
}

impl CanvasConfig {
    pub fn validate(&self) -> Result<()> {
        if self.persistence.backend == PersistenceBackend::File
            && self.persistence.dir.as_os_str().is_empty()
        {
            return Err(anyhow!("persistence.dir must be non-empty for the file backend"));
        }
        if self.server.broadcast_capacity == 0 {
            return Err(anyhow!("server.broadcast_capacity must be > 0"));
        }
        if self.server.keep_alive_secs == 0 {
            return Err(anyhow!("server.keep_alive_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CanvasConfig::default()`.
pub fn load_config(path: &Path) -> Result<CanvasConfig> {
    if !path.exists() {
        let cfg = CanvasConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CanvasConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CanvasConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))
}
