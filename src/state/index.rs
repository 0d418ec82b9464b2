//! Target index management.
//!
//! `targets.json` under the output root lists every target that has been
//! created, with its status and, for duplicates, the source it was copied
//! from. The index is re-read on every access since other processes may
//! update it. Updates hold `targets.json.lock` for the whole
//! read-modify-write, so concurrent writers never lose each other's changes.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record::RunStatus;
use super::unique_sibling;
use crate::error::{PipewrightError, Result};

/// File name of the index inside the output root.
pub const INDEX_FILE: &str = "targets.json";

/// How long an update waits for the index lock.
const LOCK_WAIT: Duration = Duration::from_secs(10);

/// A lock file older than this is left over from a crashed writer.
const LOCK_ABANDONED: Duration = Duration::from_secs(30);

const LOCK_POLL: Duration = Duration::from_millis(5);

/// Entry for a target in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl TargetEntry {
    pub fn new(status: RunStatus, source: Option<String>) -> Self {
        Self {
            status,
            source,
            created_at: Utc::now(),
            deleted: false,
        }
    }
}

/// Read access the duplication guard needs.
pub trait TargetRegistry {
    /// Present in the registry and not deleted.
    fn is_registered(&self, target: &str) -> Result<bool>;

    /// Drop any trace of the target. Missing targets are not an error.
    fn forget(&self, target: &str) -> Result<()>;
}

/// File-backed index of targets.
#[derive(Debug, Clone)]
pub struct TargetIndex {
    path: PathBuf,
}

impl TargetIndex {
    pub fn new(output_root: &Path) -> Self {
        Self {
            path: output_root.join(INDEX_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, keyed by target id.
    pub fn entries(&self) -> Result<BTreeMap<String, TargetEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| PipewrightError::ConfigParseError {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    pub fn get(&self, target: &str) -> Result<Option<TargetEntry>> {
        Ok(self.entries()?.remove(target))
    }

    /// Add or replace an entry.
    pub fn register(&self, target: &str, entry: TargetEntry) -> Result<()> {
        self.modify(|entries| {
            entries.insert(target.to_string(), entry);
        })
    }

    /// Update the status of an entry, creating it if absent.
    pub fn set_status(&self, target: &str, status: RunStatus) -> Result<()> {
        self.modify(|entries| {
            entries
                .entry(target.to_string())
                .and_modify(|e| e.status = status)
                .or_insert_with(|| TargetEntry::new(status, None));
        })
    }

    pub fn mark_deleted(&self, target: &str) -> Result<()> {
        self.modify(|entries| {
            if let Some(entry) = entries.get_mut(target) {
                entry.deleted = true;
            }
        })
    }

    pub fn remove(&self, target: &str) -> Result<bool> {
        let mut removed = false;
        self.modify(|entries| removed = entries.remove(target).is_some())?;
        Ok(removed)
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn modify(&self, change: impl FnOnce(&mut BTreeMap<String, TargetEntry>)) -> Result<()> {
        let _lock = IndexLock::acquire(self.lock_path())?;
        let mut entries = self.entries()?;
        change(&mut entries);
        self.save(&entries)
    }

    /// Save using the write-to-temp-then-rename pattern.
    fn save(&self, entries: &BTreeMap<String, TargetEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| anyhow::anyhow!("Failed to serialize index: {}", e))?;

        let temp_path = unique_sibling(&self.path, "tmp");
        fs::write(&temp_path, content)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Exclusive hold on the index for one update. Removed on drop.
struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() != io::ErrorKind::AlreadyExists => return Err(e.into()),
                Err(_) => {}
            }
            if is_abandoned(&path) {
                break_abandoned(&path);
                continue;
            }
            if Instant::now() >= deadline {
                return Err(anyhow::anyhow!(
                    "Timed out waiting for index lock {}",
                    path.display()
                )
                .into());
            }
            thread::sleep(LOCK_POLL);
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove index lock {}: {}", self.path.display(), e);
            }
        }
    }
}

fn is_abandoned(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .map(|age| age > LOCK_ABANDONED)
        .unwrap_or(false)
}

/// Move an abandoned lock aside. Only one waiter's rename can succeed; if
/// the moved file turns out to be fresh it belonged to a live writer and is
/// put back.
fn break_abandoned(path: &Path) {
    let claim = unique_sibling(path, "abandoned");
    if fs::rename(path, &claim).is_err() {
        return;
    }
    if !is_abandoned(&claim) && fs::hard_link(&claim, path).is_err() {
        warn!("Index lock {} was replaced while being broken", path.display());
    }
    let _ = fs::remove_file(&claim);
    debug!("Broke abandoned index lock {}", path.display());
}

impl TargetRegistry for TargetIndex {
    fn is_registered(&self, target: &str) -> Result<bool> {
        Ok(self.get(target)?.map(|e| !e.deleted).unwrap_or(false))
    }

    fn forget(&self, target: &str) -> Result<()> {
        self.remove(target).map(|_| ())
    }
}
