//! Ephemeral local snapshot: a single JSON blob holding the session
//! configuration, browse list, ledger and queue cursor. It exists so the UI
//! can come back instantly; it is never trusted for resume positions.

use crate::catalog::{Track, TrackKey};
use crate::ledger::Entry;
use crate::notifier::WindowPrefs;
use crate::session::state::SessionConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_NAME: &str = "play_state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub config: SessionConfig,
    pub browse: Vec<Track>,
    pub entries: Vec<Entry>,
    pub queue: Vec<TrackKey>,
    pub queue_index: Option<usize>,
    pub current: Option<Track>,
    pub window: WindowPrefs,
}

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SNAPSHOT_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the blob. A missing file is `None`; an unreadable one is logged
    /// and treated as missing.
    pub fn load(&self) -> Option<Snapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding malformed snapshot");
                None
            }
        }
    }

    /// Overwrite the blob wholesale.
    pub fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
        }
        let raw = serde_json::to_vec(snapshot).context("serialize snapshot")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}
