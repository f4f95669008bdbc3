//! Home-based storage paths for engine persistence.
//!
//! Everything lives under `~/.case-engine/` unless the configuration points
//! elsewhere:
//! - `journal/` - event logs and snapshots, one pair per actor
//! - `definitions/` - case definitions read by the file definition provider
//! - `logs/audit.jsonl` - transaction audit log

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

const ENGINE_DIR: &str = ".case-engine";

static HOME_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Returns `~/.case-engine/`, creating it when missing.
pub fn engine_home_dir() -> Result<PathBuf> {
    let overridden = HOME_OVERRIDE.lock().ok().and_then(|guard| guard.clone());
    let home = match overridden {
        Some(home) => home,
        None => dirs::home_dir().context("Could not determine home directory for engine storage")?,
    };
    let dir = home.join(ENGINE_DIR);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create engine directory: {}", dir.display()))?;
    Ok(dir)
}

fn sub_dir(name: &str) -> Result<PathBuf> {
    let dir = engine_home_dir()?.join(name);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns `~/.case-engine/journal/`.
pub fn journal_dir() -> Result<PathBuf> {
    sub_dir("journal")
}

/// Returns `~/.case-engine/definitions/`.
pub fn definitions_dir() -> Result<PathBuf> {
    sub_dir("definitions")
}

/// Returns `~/.case-engine/logs/audit.jsonl`.
pub fn audit_log_path() -> Result<PathBuf> {
    Ok(sub_dir("logs")?.join("audit.jsonl"))
}

/// Redirects the engine home until the guard is dropped.
pub struct HomeOverrideGuard {
    previous: Option<PathBuf>,
}

impl Drop for HomeOverrideGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = HOME_OVERRIDE.lock() {
            *guard = self.previous.take();
        }
    }
}

pub fn set_home_for_test(home: PathBuf) -> HomeOverrideGuard {
    let previous = HOME_OVERRIDE
        .lock()
        .ok()
        .and_then(|mut guard| guard.replace(home));
    HomeOverrideGuard { previous }
}

#[cfg(test)]
#[path = "tests/engine_paths_tests.rs"]
mod tests;
