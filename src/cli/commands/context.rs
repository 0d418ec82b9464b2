//! Project state shared by commands.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::lock::TargetLayout;
use crate::plugin::{
    discover_plugin_directories, register_builtins, LoadMode, LoadReport, PluginLoader,
    PluginRegistry,
};
use crate::settings::{load_settings, Settings};
use crate::state::TargetIndex;
use crate::workflow::WorkflowDefinition;

/// Settings and layout of the project a command runs in.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub settings: Settings,
    pub layout: TargetLayout,
}

impl ProjectContext {
    pub fn load(root: &Path, settings_path: Option<&Path>) -> Result<Self> {
        let settings = load_settings(root, settings_path)?;
        let layout = TargetLayout::from_settings(&settings, root);
        Ok(Self {
            root: root.to_path_buf(),
            settings,
            layout,
        })
    }

    /// Resolve a path from settings or arguments against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        }
    }

    pub fn index(&self) -> TargetIndex {
        TargetIndex::new(&self.layout.output_root)
    }

    /// Load the workflow named by `explicit`, else the configured one.
    pub fn workflow(&self, explicit: Option<&Path>) -> Result<WorkflowDefinition> {
        let path = self.resolve(explicit.unwrap_or(&self.settings.workflow));
        WorkflowDefinition::load(&path)
    }

    /// Builtins plus every plugin found under the plugin roots.
    pub fn registry(&self) -> Result<(PluginRegistry, LoadReport)> {
        let registry = PluginRegistry::new();
        register_builtins(&registry)?;

        let roots = discover_plugin_directories(&self.settings.plugin_paths, &self.root);
        let mode = if self.settings.strict_plugins {
            LoadMode::Strict
        } else {
            LoadMode::IgnoreErrors
        };
        let report = PluginLoader::new(&registry).load_all(&roots, mode)?;
        Ok((registry, report))
    }
}
