//! Persistent run-state storage.
//!
//! Each target's output directory holds a `run_status.json`. Superseded
//! records are copied to `archive/` before a new run overwrites them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::record::RunRecord;
use super::unique_sibling;
use crate::error::{PipewrightError, Result};

/// File name of the run record inside an output directory.
pub const STATUS_FILE: &str = "run_status.json";

/// Subdirectory of the output directory holding superseded records.
pub const ARCHIVE_DIR: &str = "archive";

/// Reads and writes the run record of one target.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    output_dir: PathBuf,
    heartbeat: Duration,
}

impl RunStateStore {
    pub fn new(output_dir: impl Into<PathBuf>, heartbeat: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            heartbeat,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join(STATUS_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the current record, if there is one.
    pub fn load(&self) -> Result<Option<RunRecord>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let record = serde_json::from_str(&content).map_err(|e| {
            PipewrightError::ConfigParseError {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Some(record))
    }

    /// Refresh the heartbeat and write the record atomically.
    pub fn save(&self, record: &mut RunRecord) -> Result<()> {
        record.touch(self.heartbeat);
        fs::create_dir_all(&self.output_dir)?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| anyhow::anyhow!("Failed to serialize run record: {}", e))?;

        // Atomic write: write to temp file, then rename
        let path = self.path();
        let temp_path = unique_sibling(&path, "tmp");
        fs::write(&temp_path, content)?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Copy the current record into the archive. Returns the archive path.
    pub fn archive(&self) -> Result<Option<PathBuf>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let archive_dir = self.output_dir.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive_dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut target = archive_dir.join(format!("run-{}.json", stamp));
        let mut n = 1;
        while target.exists() {
            target = archive_dir.join(format!("run-{}-{}.json", stamp, n));
            n += 1;
        }
        fs::copy(&path, &target)?;
        debug!("Archived run record to {}", target.display());
        Ok(Some(target))
    }

    /// Archived record paths, oldest first.
    pub fn archived(&self) -> Result<Vec<PathBuf>> {
        let dir = self.output_dir.join(ARCHIVE_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();
        Ok(paths)
    }
}
