//! Status command implementation.
//!
//! The `pipewright status [target]` command shows a target's run record, or
//! lists the targets in the index.

use std::path::{Path, PathBuf};

use crate::cli::args::StatusArgs;
use crate::error::Result;
use crate::state::{CompletedStep, RunRecord, RunStateStore};
use crate::ui::UserInterface;

use super::context::ProjectContext;
use super::dispatcher::{Command, CommandResult};

/// The status command implementation.
pub struct StatusCommand {
    project_root: PathBuf,
    settings_path: Option<PathBuf>,
    args: StatusArgs,
}

impl StatusCommand {
    pub fn new(project_root: &Path, settings_path: Option<&Path>, args: StatusArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            settings_path: settings_path.map(Path::to_path_buf),
            args,
        }
    }

    fn list_targets(&self, ctx: &ProjectContext, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let entries = ctx.index().entries()?;
        if self.args.json {
            let json = serde_json::to_string_pretty(&entries)
                .map_err(|e| anyhow::anyhow!("Failed to serialize index: {}", e))?;
            println!("{}", json);
            return Ok(CommandResult::success());
        }
        if entries.is_empty() {
            ui.message("No targets yet");
        }
        for (id, entry) in entries.iter().filter(|(_, e)| !e.deleted) {
            let mut line = format!("{}  {}", id, entry.status);
            if let Some(source) = &entry.source {
                line.push_str(&format!("  (copy of {})", source));
            }
            ui.message(&line);
        }
        Ok(CommandResult::success())
    }

    fn show_record(&self, record: &RunRecord, ui: &mut dyn UserInterface) {
        ui.show_header(&format!("{} · {}", record.target, record.workflow));
        ui.message(&format!("Status: {}", record.status));
        if let Some(step) = &record.current_step {
            ui.message(&format!("Current step: {}", step));
        }
        if let Some(started) = record.started_at {
            ui.message(&format!("Started: {}", started.format("%Y-%m-%d %H:%M:%S")));
        }
        if let Some(ended) = record.ended_at {
            ui.message(&format!("Ended: {}", ended.format("%Y-%m-%d %H:%M:%S")));
        }
        if !record.usage.is_zero() {
            ui.message(&format!(
                "Tokens: {} ({} in, {} out)",
                record.usage.total, record.usage.input, record.usage.output
            ));
        }

        if !record.plan.is_empty() {
            ui.message("");
            ui.message("Plan:");
            for step in &record.plan {
                let marker = if step.run { "▸" } else { "○" };
                ui.message(&format!("  {} {}: {}", marker, step.step, step.reason));
            }
        }

        let steps: Vec<&CompletedStep> = if self.args.history {
            record.history()
        } else {
            record.completed_steps.iter().rev().collect()
        };
        if !steps.is_empty() {
            ui.message("");
            ui.message("Completed:");
            for step in steps {
                ui.message(&format!(
                    "  {}  {}  {:.1}s",
                    step.step,
                    step.completed.format("%Y-%m-%d %H:%M:%S"),
                    step.duration_secs
                ));
            }
        }

        if let Some(error) = &record.error {
            ui.error(error);
        }
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = ProjectContext::load(&self.project_root, self.settings_path.as_deref())?;
        let Some(target) = &self.args.target else {
            return self.list_targets(&ctx, ui);
        };

        let store = RunStateStore::new(ctx.layout.output_dir(target), ctx.settings.heartbeat());
        let Some(record) = store.load()? else {
            ui.warning(&format!("No run record for '{}'", target));
            return Ok(CommandResult::failure(2));
        };

        if self.args.json {
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| anyhow::anyhow!("Failed to serialize run record: {}", e))?;
            println!("{}", json);
        } else {
            self.show_record(&record, ui);
        }
        Ok(CommandResult::success())
    }
}
