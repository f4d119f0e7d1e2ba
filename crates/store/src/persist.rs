//! Snapshot persistence for the workspace
//!
//! The whole store serializes into one JSON slot. Every save is a total
//! overwrite of that slot; load happens once at startup and degrades to
//! the empty default instead of failing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::model::{ChatSession, Project};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Bumped whenever the on-disk layout changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything that survives a restart. Selection pointers and other
/// derived state are rebuilt at runtime and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub projects: Vec<Project>,
    pub sessions: Vec<ChatSession>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            projects: Vec::new(),
            sessions: Vec::new(),
        }
    }
}

/// The single durable slot backing the store.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Platform default location under the user config dir.
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Astra", "Astra")
            .map(|p| p.config_dir().join("astra_agent_data.json"))
            .unwrap_or_else(|| PathBuf::from("./astra_agent_data.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the slot. A missing file, unreadable file, corrupt JSON, or an
    /// unrecognized version all load as the empty default; persistence
    /// problems never stop the app.
    pub fn load(&self) -> Snapshot {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Snapshot::default(),
            Err(e) => {
                warn!("could not read {}: {}", self.path.display(), e);
                return Snapshot::default();
            }
        };
        let snapshot: Snapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("corrupt snapshot at {}: {}", self.path.display(), e);
                return Snapshot::default();
            }
        };
        if snapshot.version != SCHEMA_VERSION {
            warn!(
                "snapshot version {} unsupported (expected {}), starting empty",
                snapshot.version, SCHEMA_VERSION
            );
            return Snapshot::default();
        }
        snapshot
    }

    /// Overwrite the slot with the full snapshot. Writes a sibling temp
    /// file first so a crash mid-write cannot truncate existing data.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl Default for SnapshotFile {
    fn default() -> Self {
        Self::new()
    }
}
