//! Discovery and loading of external plugins.
//!
//! A plugin root holds one subdirectory per plugin. Each plugin directory
//! carries a [`MANIFEST_FILE`] whose `entry` names an executable in that
//! directory and the symbol to invoke.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::command::CommandPlugin;
use super::contract::Plugin;
use super::manifest::{PluginManifest, MANIFEST_FILE};
use super::registry::PluginRegistry;
use crate::error::Result;

/// Environment variable holding extra plugin roots, separated like `PATH`.
pub const PLUGINS_PATH_ENV: &str = "PIPEWRIGHT_PLUGINS_PATH";

/// A plugin directory that could not be loaded.
#[derive(Debug, Error)]
#[error("Failed to load plugin at {}: {reason}", path.display())]
pub struct PluginLoadError {
    pub path: PathBuf,
    pub reason: LoadFailure,
}

/// Why a plugin failed to load.
#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("{} not found", MANIFEST_FILE)]
    ManifestMissing,

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Entry file not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    #[error("invalid entry '{0}': expected 'file:symbol' with file inside the plugin directory")]
    InvalidEntry(String),

    #[error("symbol '{symbol}' not found in entry")]
    SymbolNotFound { symbol: String },

    #[error("does not satisfy the plugin contract: {0}")]
    NotAPlugin(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to react to a plugin that fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Abort on the first failure.
    #[default]
    Strict,
    /// Record the failure and keep going.
    IgnoreErrors,
}

/// Outcome of loading a plugin root.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids registered, in load order.
    pub loaded: Vec<String>,
    pub failures: Vec<PluginLoadError>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.loaded.extend(other.loaded);
        self.failures.extend(other.failures);
    }
}

/// Loads plugin directories into a registry.
pub struct PluginLoader<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> PluginLoader<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Load a single plugin directory without registering it.
    pub fn load_plugin(&self, dir: &Path) -> std::result::Result<Arc<dyn Plugin>, PluginLoadError> {
        let fail = |reason| PluginLoadError {
            path: dir.to_path_buf(),
            reason,
        };

        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(fail(LoadFailure::ManifestMissing));
        }
        let content = fs::read_to_string(&manifest_path).map_err(|e| fail(e.into()))?;
        let manifest =
            PluginManifest::parse(&content).map_err(|e| fail(LoadFailure::InvalidManifest(e)))?;

        let entry = manifest
            .entry_point()
            .ok_or_else(|| fail(LoadFailure::InvalidEntry(manifest.entry.clone())))?;
        let program = dir.join(&entry.file);
        if !program.is_file() {
            return Err(fail(LoadFailure::EntryNotFound(program)));
        }

        let plugin = CommandPlugin::load(manifest.metadata(), program, entry.symbol, dir)
            .map_err(fail)?;
        debug!(
            "Plugin {} runs {} as '{}'",
            manifest.id,
            plugin.program().display(),
            plugin.symbol()
        );
        Ok(Arc::new(plugin))
    }

    /// Load every plugin under `root`, in sorted directory order.
    ///
    /// Subdirectories without a manifest are skipped silently and a missing
    /// root yields an empty report.
    pub fn load_directory(&self, root: &Path, mode: LoadMode) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        if !root.is_dir() {
            debug!("Plugin root {} does not exist", root.display());
            return Ok(report);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            if !dir.join(MANIFEST_FILE).is_file() {
                continue;
            }
            match self.load_plugin(&dir) {
                Ok(plugin) => {
                    let id = plugin.id().to_string();
                    info!("Loaded plugin {} from {}", id, dir.display());
                    self.registry.register_or_replace(plugin);
                    report.loaded.push(id);
                }
                Err(e) if mode == LoadMode::IgnoreErrors => {
                    warn!("{}", e);
                    report.failures.push(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }

    /// Load every root in order; later roots win on id collisions.
    pub fn load_all(&self, roots: &[PathBuf], mode: LoadMode) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for root in roots {
            report.merge(self.load_directory(root, mode)?);
        }
        Ok(report)
    }
}

/// Plugin roots to search: configured paths, `<cwd>/plugins`, then
/// [`PLUGINS_PATH_ENV`]. Duplicates and missing directories are dropped.
pub fn discover_plugin_directories(configured: &[PathBuf], cwd: &Path) -> Vec<PathBuf> {
    discover_with_env(configured, cwd, std::env::var_os(PLUGINS_PATH_ENV))
}

fn discover_with_env(configured: &[PathBuf], cwd: &Path, env: Option<OsString>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = configured
        .iter()
        .map(|p| if p.is_relative() { cwd.join(p) } else { p.clone() })
        .collect();
    candidates.push(cwd.join("plugins"));
    if let Some(value) = env {
        candidates.extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|p| p.is_dir())
        .filter(|p| seen.insert(p.canonicalize().unwrap_or_else(|_| p.clone())))
        .collect()
}
