//! Plugins command implementation.
//!
//! The `pipewright plugins` command lists builtin and loaded plugins.

use std::path::{Path, PathBuf};

use crate::cli::args::PluginsArgs;
use crate::error::Result;
use crate::plugin::PluginMetadata;
use crate::ui::UserInterface;

use super::context::ProjectContext;
use super::dispatcher::{Command, CommandResult};

/// The plugins command implementation.
pub struct PluginsCommand {
    project_root: PathBuf,
    settings_path: Option<PathBuf>,
    args: PluginsArgs,
}

impl PluginsCommand {
    pub fn new(project_root: &Path, settings_path: Option<&Path>, args: PluginsArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            settings_path: settings_path.map(Path::to_path_buf),
            args,
        }
    }
}

fn describe(meta: &PluginMetadata) -> String {
    let mut line = format!("{} {}", meta.id, meta.version);
    if meta.name != meta.id {
        line.push_str(&format!("  {}", meta.name));
    }
    if !meta.description.is_empty() {
        line.push_str(&format!(": {}", meta.description));
    }
    if meta.uses_external_service {
        line.push_str(" [external service]");
    }
    line
}

impl Command for PluginsCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = ProjectContext::load(&self.project_root, self.settings_path.as_deref())?;
        let (registry, report) = ctx.registry()?;
        let plugins = registry.list();

        if self.args.json {
            let json = serde_json::to_string_pretty(&plugins)
                .map_err(|e| anyhow::anyhow!("Failed to serialize plugins: {}", e))?;
            println!("{}", json);
        } else {
            for meta in &plugins {
                ui.message(&describe(meta));
            }
            for failure in &report.failures {
                ui.warning(&failure.to_string());
            }
        }

        if report.failures.is_empty() {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(1))
        }
    }
}
