//! Validation of `.canvas/` layout and persisted session documents.

use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::invariants::validate_invariants;
use crate::core::types::SessionKey;
use crate::io::config::PersistenceBackend;
use crate::io::init::CanvasPaths;
use crate::io::persistence::{FileStore, StatePersistence};

/// Outcome of validating one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidation {
    /// No document persisted for the session yet.
    Missing,
    /// Document loaded; `violations` lists broken invariants (empty when consistent).
    Loaded { violations: Vec<String> },
}

/// Check config, then load the session file (schema + deserialize) and check
/// its invariants.
pub fn validate_session(root: &Path, key: &SessionKey) -> Result<SessionValidation> {
    let paths = CanvasPaths::new(root);
    if !paths.canvas_dir.is_dir() {
        return Err(anyhow!(
            "missing {} (run `canvas init`)",
            paths.canvas_dir.display()
        ));
    }
    let config = paths.load_config().context("load config.toml")?;
    if config.persistence.backend != PersistenceBackend::File {
        return Err(anyhow!("validate requires the file persistence backend"));
    }

    let store = FileStore::new(root.join(&config.persistence.dir));
    let Some(state) = store
        .get(key)
        .with_context(|| format!("load session {key}"))?
    else {
        return Ok(SessionValidation::Missing);
    };
    Ok(SessionValidation::Loaded {
        violations: validate_invariants(&state),
    })
}
