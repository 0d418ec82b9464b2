//! Project settings.
//!
//! Settings come from `pipewright.yml` in the project root. Every field has
//! a default, so the file is optional.

pub mod loader;

use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use loader::{load_settings, load_settings_file, SETTINGS_FILE};

/// Environment variable overriding [`Settings::output_root`].
pub const OUTPUT_ROOT_ENV: &str = "PIPEWRIGHT_OUTPUT_ROOT";

/// Settings for a pipewright project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Root of per-target output directories and the target index.
    pub output_root: PathBuf,

    /// Directory of input files.
    pub input_dir: PathBuf,

    /// Directory of per-target run configurations.
    pub config_dir: PathBuf,

    /// Extension of input files, without the dot.
    pub input_extension: String,

    /// Workflow definition, YAML or JSON.
    pub workflow: PathBuf,

    /// Legacy step specs. When unset, specs are derived from the workflow.
    pub step_specs: Option<PathBuf>,

    /// Extra plugin roots.
    pub plugin_paths: Vec<PathBuf>,

    /// Age after which a duplication lock is considered abandoned.
    pub lock_ttl_secs: u64,

    /// How far ahead each run-record save pushes `lock_until`.
    pub heartbeat_secs: u64,

    /// Step skipped by `--without-rendering`.
    pub rendering_step: Option<String>,

    /// Output files never copied when duplicating with reuse.
    pub always_regenerate: Vec<String>,

    /// Fail on the first plugin that does not load.
    pub strict_plugins: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("outputs"),
            input_dir: PathBuf::from("inputs"),
            config_dir: PathBuf::from("configs"),
            input_extension: "csv".to_string(),
            workflow: PathBuf::from("workflow.yml"),
            step_specs: None,
            plugin_paths: Vec::new(),
            lock_ttl_secs: 600,
            heartbeat_secs: 300,
            rendering_step: None,
            always_regenerate: Vec::new(),
            strict_plugins: false,
        }
    }
}

impl Settings {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Apply environment overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(OUTPUT_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.output_root = PathBuf::from(root);
        }
    }
}
