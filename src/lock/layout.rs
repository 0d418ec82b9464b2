//! Where a target's files live.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::{PipewrightError, Result};
use crate::settings::Settings;

/// Directory under the output root holding lock tokens.
pub const LOCKS_DIR: &str = ".locks";

/// Filesystem layout of targets.
///
/// - config: `<config_dir>/<target>.json`
/// - input: `<input_dir>/<target>.<ext>`
/// - output: `<output_root>/<target>/`
/// - lock: `<output_root>/.locks/<target>.lock`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    pub output_root: PathBuf,
    pub input_dir: PathBuf,
    pub config_dir: PathBuf,
    pub input_extension: String,
}

impl TargetLayout {
    pub fn new(
        output_root: impl Into<PathBuf>,
        input_dir: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
        input_extension: impl Into<String>,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            input_dir: input_dir.into(),
            config_dir: config_dir.into(),
            input_extension: input_extension.into(),
        }
    }

    /// Layout from settings, with relative paths anchored at `root`.
    pub fn from_settings(settings: &Settings, root: &Path) -> Self {
        let anchor = |p: &Path| {
            if p.is_relative() {
                root.join(p)
            } else {
                p.to_path_buf()
            }
        };
        Self::new(
            anchor(&settings.output_root),
            anchor(&settings.input_dir),
            anchor(&settings.config_dir),
            settings.input_extension.clone(),
        )
    }

    /// Reject ids that are not `[A-Za-z0-9_-]+`.
    pub fn validate_target(target: &str) -> Result<()> {
        let valid = Regex::new(r"^[A-Za-z0-9_-]+$")
            .map(|re| re.is_match(target))
            .unwrap_or(false);
        if valid {
            Ok(())
        } else {
            Err(PipewrightError::InvalidTarget {
                target: target.to_string(),
            })
        }
    }

    pub fn config_path(&self, target: &str) -> PathBuf {
        self.config_dir.join(format!("{}.json", target))
    }

    pub fn input_path(&self, target: &str) -> PathBuf {
        self.input_dir
            .join(format!("{}.{}", target, self.input_extension))
    }

    pub fn output_dir(&self, target: &str) -> PathBuf {
        self.output_root.join(target)
    }

    pub fn lock_path(&self, target: &str) -> PathBuf {
        self.output_root
            .join(LOCKS_DIR)
            .join(format!("{}.lock", target))
    }

    /// Whether any of the target's files exist.
    pub fn any_exists(&self, target: &str) -> bool {
        self.config_path(target).exists()
            || self.input_path(target).exists()
            || self.output_dir(target).exists()
    }

    /// Delete the target's config file, input file, and output directory.
    pub fn remove_partial(&self, target: &str) -> Result<()> {
        remove_if_exists(&self.config_path(target), false)?;
        remove_if_exists(&self.input_path(target), false)?;
        remove_if_exists(&self.output_dir(target), true)?;
        debug!("Removed partial artifacts of {}", target);
        Ok(())
    }
}

fn remove_if_exists(path: &Path, dir: bool) -> io::Result<()> {
    let result = if dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
