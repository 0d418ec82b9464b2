//! Exclusive, TTL-bounded locks keyed by target id.
//!
//! A lock is a token file created with exclusive-create semantics. A token
//! older than the TTL is stale: the holder is presumed dead, and the lock
//! may be reclaimed once the target is known not to have been completed.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::layout::TargetLayout;
use crate::error::{ConflictReason, PipewrightError, Result};
use crate::state::{unique_sibling, TargetRegistry};

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    pub created_at: DateTime<Utc>,
    pub holder: String,
    pub pid: u32,
}

/// Acquires duplication locks for targets.
pub struct DuplicationGuard<'a> {
    layout: &'a TargetLayout,
    registry: &'a dyn TargetRegistry,
    ttl: Duration,
    holder: String,
}

impl<'a> DuplicationGuard<'a> {
    pub fn new(layout: &'a TargetLayout, registry: &'a dyn TargetRegistry, ttl: Duration) -> Self {
        Self {
            layout,
            registry,
            ttl,
            holder: format!("pipewright-{}", std::process::id()),
        }
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Take the lock for `target`.
    ///
    /// A live token is a conflict. A stale token is claimed by renaming it
    /// aside, so only one of several waiters can reclaim it, and the claimer
    /// writes its own token before looking at the target. On a registered
    /// target that token is dropped again and the conflict is reported
    /// without touching the target. Otherwise the target's partial artifacts
    /// are cleaned up under the new token.
    pub fn acquire(&self, target: &str) -> Result<LockHandle> {
        TargetLayout::validate_target(target)?;
        let path = self.layout.lock_path(target);

        match self.write_token(&path) {
            Ok(()) => return Ok(self.handle(target, path)),
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => return Err(e.into()),
            Err(_) => {}
        }

        if !self.is_expired(&path) {
            return Err(conflict(target, ConflictReason::InProgress));
        }

        // Move the stale token aside. Only one waiter's rename can succeed;
        // the others see it gone and back off.
        let claim = unique_sibling(&path, "reclaim");
        match fs::rename(&path, &claim) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(conflict(target, ConflictReason::InProgress));
            }
            Err(e) => return Err(e.into()),
        }
        if !self.is_expired(&claim) {
            // A fresh token was written between the check and the rename.
            restore_token(&claim, &path);
            return Err(conflict(target, ConflictReason::InProgress));
        }

        // Take the lock before touching the target so a waiter arriving
        // now cannot start on it while the partial artifacts are removed.
        let taken = self.write_token(&path);
        remove_token(&claim);
        match taken {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(conflict(target, ConflictReason::InProgress));
            }
            Err(e) => return Err(e.into()),
        }
        let handle = self.handle(target, path);

        if self.registry.is_registered(target)? {
            return Err(conflict(target, ConflictReason::AlreadyExists));
        }

        warn!("Reclaiming stale lock for {}", target);
        self.layout.remove_partial(target)?;
        self.registry.forget(target)?;
        Ok(handle)
    }

    /// Read the token of a target's lock, if there is a readable one.
    pub fn token(&self, target: &str) -> Option<LockToken> {
        read_token(&self.layout.lock_path(target))
    }

    fn handle(&self, target: &str, path: PathBuf) -> LockHandle {
        debug!("Acquired lock for {} at {}", target, path.display());
        LockHandle {
            target: target.to_string(),
            path,
            released: false,
        }
    }

    fn write_token(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let token = LockToken {
            created_at: Utc::now(),
            holder: self.holder.clone(),
            pid: std::process::id(),
        };
        let content = serde_json::to_vec(&token).map_err(io::Error::other)?;
        file.write_all(&content)?;
        file.sync_all()
    }

    fn is_expired(&self, path: &Path) -> bool {
        let created = read_token(path)
            .map(|t| t.created_at)
            .or_else(|| {
                fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            });
        let Some(created) = created else {
            return true;
        };
        let age = (Utc::now() - created).to_std().unwrap_or(Duration::ZERO);
        age > self.ttl
    }
}

fn read_token(path: &Path) -> Option<LockToken> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Put a token moved aside by mistake back in place, unless a new one has
/// been created there since.
fn restore_token(claim: &Path, path: &Path) {
    if let Err(e) = fs::hard_link(claim, path) {
        warn!("Could not restore lock {}: {}", path.display(), e);
    }
    remove_token(claim);
}

fn remove_token(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove lock {}: {}", path.display(), e);
        }
    }
}

fn conflict(target: &str, reason: ConflictReason) -> PipewrightError {
    PipewrightError::LockConflict {
        target: target.to_string(),
        reason,
    }
}

/// A held lock. Released on drop if not released explicitly.
#[derive(Debug)]
pub struct LockHandle {
    target: String,
    path: PathBuf,
    released: bool,
}

impl LockHandle {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the token. A missing token is not an error.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Released lock for {}", self.target);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
