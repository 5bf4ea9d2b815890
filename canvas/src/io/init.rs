//! Initialization helpers for `.canvas/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{CanvasConfig, load_config, write_config};

/// Canonical paths within `.canvas/` for a project root.
#[derive(Debug, Clone)]
pub struct CanvasPaths {
    pub root: PathBuf,
    pub canvas_dir: PathBuf,
    pub config_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl CanvasPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let canvas_dir = root.join(".canvas");
        Self {
            root: root.clone(),
            config_path: canvas_dir.join("config.toml"),
            sessions_dir: canvas_dir.join("sessions"),
            gitignore_path: canvas_dir.join(".gitignore"),
            canvas_dir,
        }
    }

    /// Load `config.toml`, falling back to defaults when it does not exist.
    pub fn load_config(&self) -> Result<CanvasConfig> {
        load_config(&self.config_path)
    }
}

/// Options for `init_canvas`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite the existing config and ignore file.
    pub force: bool,
}

/// Create `.canvas/` scaffolding in `root`.
///
/// Fails if `.canvas/` already exists unless `options.force` is set. Session
/// files are never touched.
pub fn init_canvas(root: &Path, options: &InitOptions) -> Result<CanvasPaths> {
    let paths = CanvasPaths::new(root);
    if paths.canvas_dir.exists() && !options.force {
        return Err(anyhow!(
            "canvas init: .canvas already exists (use --force to overwrite)"
        ));
    }
    if paths.canvas_dir.exists() && !paths.canvas_dir.is_dir() {
        return Err(anyhow!("canvas init: .canvas exists but is not a directory"));
    }

    create_dir(&paths.canvas_dir)?;
    create_dir(&paths.sessions_dir)?;
    fs::write(&paths.gitignore_path, CANVAS_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &CanvasConfig::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

const CANVAS_GITIGNORE: &str = "sessions/\n";
