//! Persistence for working-directory registry snapshots.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::registry::WorkingDirectoryRegistry;

/// Load a registry snapshot from JSON.
pub fn load_registry(path: &Path) -> Result<WorkingDirectoryRegistry> {
    debug!(path = %path.display(), "loading registry");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read registry {}", path.display()))?;
    let registry: WorkingDirectoryRegistry = serde_json::from_str(&contents)
        .with_context(|| format!("parse registry {}", path.display()))?;
    debug!(entries = registry.len(), "registry loaded");
    Ok(registry)
}

/// Atomically write a registry snapshot (temp file + rename).
pub fn write_registry(path: &Path, registry: &WorkingDirectoryRegistry) -> Result<()> {
    debug!(path = %path.display(), entries = registry.len(), "writing registry");
    let mut buf = serde_json::to_string_pretty(registry)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("registry path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp registry {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace registry {}", path.display()))?;
    Ok(())
}
