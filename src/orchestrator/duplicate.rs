//! Copying a target into a new one.
//!
//! The copy runs under the [`DuplicationGuard`] of the new target, so two
//! requests for the same new id cannot interleave. With reuse enabled the
//! source's outputs and run record come along, and the next incremental run
//! of the copy only re-executes what its overrides invalidate.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::incremental::load_run_config;
use crate::error::{ConflictReason, PipewrightError, Result};
use crate::lock::{DuplicationGuard, TargetLayout};
use crate::state::{RunStateStore, RunStatus, TargetEntry, TargetIndex, ARCHIVE_DIR, STATUS_FILE};

const MAX_SUFFIX: u32 = 999;

/// A request to duplicate `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateRequest {
    pub source: String,
    /// New target id. Generated from the source id when absent.
    pub target: Option<String>,
    /// Config values to set, keyed by dotted path.
    pub overrides: BTreeMap<String, Value>,
    /// Copy the source's outputs and run record.
    pub reuse: bool,
}

impl DuplicateRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
            overrides: BTreeMap::new(),
            reuse: true,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_override(mut self, path: impl Into<String>, value: Value) -> Self {
        self.overrides.insert(path.into(), value);
        self
    }

    pub fn without_reuse(mut self) -> Self {
        self.reuse = false;
        self
    }
}

/// Performs duplications under the target layout.
pub struct Duplicator<'a> {
    layout: &'a TargetLayout,
    index: &'a TargetIndex,
    lock_ttl: Duration,
    heartbeat: Duration,
    always_regenerate: Vec<String>,
}

impl<'a> Duplicator<'a> {
    pub fn new(layout: &'a TargetLayout, index: &'a TargetIndex, lock_ttl: Duration) -> Self {
        Self {
            layout,
            index,
            lock_ttl,
            heartbeat: Duration::ZERO,
            always_regenerate: Vec::new(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Output files that are never carried over.
    pub fn with_always_regenerate(mut self, names: Vec<String>) -> Self {
        self.always_regenerate = names;
        self
    }

    /// Duplicate a target. Returns the new target id.
    pub fn duplicate(&self, request: &DuplicateRequest) -> Result<String> {
        TargetLayout::validate_target(&request.source)?;
        let target = match &request.target {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => self.generate_target(&request.source)?,
        };

        let guard = DuplicationGuard::new(self.layout, self.index, self.lock_ttl);
        let mut lock = guard.acquire(&target)?;

        if self.exists_anywhere(&target)? {
            lock.release()?;
            return Err(PipewrightError::LockConflict {
                target,
                reason: ConflictReason::AlreadyExists,
            });
        }

        let mut created = false;
        let outcome = self.copy(request, &target, &mut created);
        if let Err(e) = &outcome {
            if created {
                warn!("Duplication of {} failed, cleaning up: {}", target, e);
                if let Err(cleanup) = self.layout.remove_partial(&target) {
                    warn!("Cleanup of {} failed: {}", target, cleanup);
                }
            }
        }
        lock.release()?;
        outcome.map(|()| target)
    }

    /// `<source>-copy-<YYYYMMDD>`, then `-1`, `-2`, ... until unused.
    pub fn generate_target(&self, source: &str) -> Result<String> {
        let base = format!("{}-copy-{}", source, Utc::now().format("%Y%m%d"));
        if !self.exists_anywhere(&base)? {
            return Ok(base);
        }
        for n in 1..=MAX_SUFFIX {
            let candidate = format!("{}-{}", base, n);
            if !self.exists_anywhere(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(PipewrightError::LockConflict {
            target: base,
            reason: ConflictReason::AlreadyExists,
        })
    }

    /// Known to the index (even if deleted) or present on disk.
    fn exists_anywhere(&self, target: &str) -> Result<bool> {
        Ok(self.index.get(target)?.is_some() || self.layout.any_exists(target))
    }

    fn copy(&self, request: &DuplicateRequest, target: &str, created: &mut bool) -> Result<()> {
        let source = request.source.as_str();
        let mut config = load_run_config(&self.layout.config_path(source))?;
        let source_input = self.layout.input_path(source);
        if !source_input.exists() {
            return Err(PipewrightError::ConfigNotFound { path: source_input });
        }

        if let Value::Object(map) = &mut config {
            map.insert("name".to_string(), Value::String(target.to_string()));
            map.insert("input".to_string(), Value::String(target.to_string()));
        }
        for (path, value) in &request.overrides {
            set_dotted(&mut config, path, value.clone());
        }

        let config_path = self.layout.config_path(target);
        fs::create_dir_all(&self.layout.config_dir)?;
        *created = true;
        let content = serde_json::to_string_pretty(&config)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
        fs::write(&config_path, content)?;

        fs::create_dir_all(&self.layout.input_dir)?;
        fs::copy(&source_input, self.layout.input_path(target))?;

        let output_dir = self.layout.output_dir(target);
        fs::create_dir_all(&output_dir)?;

        let mut status = RunStatus::NotStarted;
        if request.reuse {
            let source_dir = self.layout.output_dir(source);
            if source_dir.is_dir() {
                self.copy_outputs(&source_dir, &output_dir)?;
            }
            let store = RunStateStore::new(&output_dir, self.heartbeat);
            match store.load()? {
                Some(mut record) => {
                    record.target = target.to_string();
                    record.lock_until = None;
                    if record.status == RunStatus::Running {
                        record.status = RunStatus::Error;
                        record.error = Some(format!("Copied from {} while running", source));
                    }
                    status = record.status;
                    store.save(&mut record)?;
                }
                None => warn!("{} not found for {}", STATUS_FILE, source),
            }
        }

        for name in &self.always_regenerate {
            let path = output_dir.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        self.index
            .register(target, TargetEntry::new(status, Some(source.to_string())))?;
        info!("Duplicated {} as {}", source, target);
        Ok(())
    }

    fn copy_outputs(&self, from: &Path, to: &Path) -> Result<()> {
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == ARCHIVE_DIR || self.always_regenerate.iter().any(|n| n == name.as_ref()) {
                debug!("Not copying {}", name);
                continue;
            }
            let dest = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                fs::create_dir_all(&dest)?;
                self.copy_outputs(&entry.path(), &dest)?;
            } else {
                fs::copy(entry.path(), dest)?;
            }
        }
        Ok(())
    }
}

/// Set `value` at a dotted path, creating intermediate maps.
///
/// A non-map met along the way is replaced by a map.
pub fn set_dotted(config: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut node = config;
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
