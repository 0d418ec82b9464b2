//! Duplicate command implementation.
//!
//! The `pipewright duplicate <source>` command copies a target's config,
//! input, and (by default) its outputs into a new target, optionally running
//! the workflow for the copy afterwards.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::cli::args::{DuplicateArgs, RunArgs};
use crate::error::Result;
use crate::orchestrator::{DuplicateRequest, Duplicator};
use crate::ui::UserInterface;

use super::context::ProjectContext;
use super::dispatcher::{Command, CommandResult};
use super::run::RunCommand;

/// Parse a `PATH=VALUE` override. The value is read as JSON when it parses,
/// else taken as a string.
pub fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected PATH=VALUE, got '{}'", raw))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(anyhow::anyhow!("Empty path in override '{}'", raw).into());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.to_string(), value))
}

/// The duplicate command implementation.
pub struct DuplicateCommand {
    project_root: PathBuf,
    settings_path: Option<PathBuf>,
    args: DuplicateArgs,
}

impl DuplicateCommand {
    pub fn new(project_root: &Path, settings_path: Option<&Path>, args: DuplicateArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            settings_path: settings_path.map(Path::to_path_buf),
            args,
        }
    }

    fn request(&self) -> Result<DuplicateRequest> {
        let mut request = DuplicateRequest::new(&self.args.source);
        if let Some(target) = &self.args.target {
            request = request.with_target(target);
        }
        for raw in &self.args.overrides {
            let (path, value) = parse_override(raw)?;
            request = request.with_override(path, value);
        }
        if self.args.no_reuse {
            request = request.without_reuse();
        }
        Ok(request)
    }
}

impl Command for DuplicateCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = ProjectContext::load(&self.project_root, self.settings_path.as_deref())?;
        let request = self.request()?;
        let index = ctx.index();
        let duplicator = Duplicator::new(&ctx.layout, &index, ctx.settings.lock_ttl())
            .with_heartbeat(ctx.settings.heartbeat())
            .with_always_regenerate(ctx.settings.always_regenerate.clone());

        let mut spinner = ui.start_spinner(&format!("Duplicating {}", request.source));
        let target = match duplicator.duplicate(&request) {
            Ok(target) => target,
            Err(e) if e.is_conflict() => {
                spinner.finish_error(&e.to_string());
                return Ok(CommandResult::failure(2));
            }
            Err(e) => {
                spinner.finish_error(&format!("Duplication of {} failed", request.source));
                return Err(e);
            }
        };
        spinner.finish_success(&format!("Created {} from {}", target, request.source));

        if !self.args.run {
            return Ok(CommandResult::success());
        }
        let run_args = RunArgs {
            target,
            skip_interaction: true,
            ..Default::default()
        };
        RunCommand::new(&self.project_root, self.settings_path.as_deref(), run_args).execute(ui)
    }
}
