//! Run command implementation.
//!
//! The `pipewright run <target>` command plans an incremental run, shows
//! the plan, and executes the steps that are out of date.

use std::path::{Path, PathBuf};

use crate::cli::args::RunArgs;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::staleness::{load_specs, Plan, PlanOptions};
use crate::ui::{SpinnerHandle, UserInterface};
use crate::workflow::{RunProgress, SkipCause};

use super::context::ProjectContext;
use super::dispatcher::{Command, CommandResult};

/// The run command implementation.
pub struct RunCommand {
    project_root: PathBuf,
    settings_path: Option<PathBuf>,
    args: RunArgs,
}

impl RunCommand {
    pub fn new(project_root: &Path, settings_path: Option<&Path>, args: RunArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            settings_path: settings_path.map(Path::to_path_buf),
            args,
        }
    }

    fn plan_options(&self, ctx: &ProjectContext) -> PlanOptions {
        PlanOptions {
            force: self.args.force,
            only: self.args.only.clone(),
            skip_rendering: self.args.without_rendering,
            rendering_step: ctx.settings.rendering_step.clone(),
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = ProjectContext::load(&self.project_root, self.settings_path.as_deref())?;
        let workflow = ctx.workflow(self.args.workflow.as_deref())?;
        let (registry, report) = ctx.registry()?;
        for failure in &report.failures {
            ui.warning(&failure.to_string());
        }

        let mut orchestrator = Orchestrator::new(&registry, &ctx.layout, ctx.settings.heartbeat());
        if let Some(path) = &ctx.settings.step_specs {
            orchestrator = orchestrator.with_specs(load_specs(&ctx.resolve(path))?);
        }

        let target = self.args.target.as_str();
        let options = self.plan_options(&ctx);

        ui.show_header(&format!("{} · {}", workflow.id, target));
        let plan = match orchestrator.plan(&workflow, target, &options) {
            Ok(plan) => plan,
            Err(e) if e.is_conflict() => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(2));
            }
            Err(e) => return Err(e),
        };
        show_plan(ui, &plan);

        if self.args.dry_run {
            return Ok(CommandResult::success());
        }
        if plan.to_run().is_empty() {
            ui.success("Everything is up to date");
            return Ok(CommandResult::success());
        }
        if ui.is_interactive() && !self.args.skip_interaction {
            let question = format!("Run {} step(s) for {}?", plan.to_run().len(), target);
            if !ui.confirm(&question, true)? {
                ui.message("Cancelled");
                return Ok(CommandResult::success());
            }
        }

        let mut spinner: Option<Box<dyn SpinnerHandle>> = None;
        let outcome = orchestrator.run(&workflow, target, &options, false, |event| match event {
            RunProgress::StepStarting { step, index, total } => {
                spinner = Some(ui.start_spinner(&format!(
                    "[{}/{}] {} ({})",
                    index + 1,
                    total,
                    step.id,
                    step.plugin
                )));
            }
            RunProgress::StepFinished { step, result, duration, .. } => {
                let mut handle = spinner.take().unwrap_or_else(|| ui.start_spinner(&step.id));
                if result.ran() {
                    handle.finish_success(&format!("{} ({:.1}s)", step.id, duration.as_secs_f64()));
                } else if result.skipped {
                    let reason = result.error.as_deref().unwrap_or("skipped");
                    handle.finish_skipped(&format!("{}: {}", step.id, reason));
                } else {
                    let reason = result.error.as_deref().unwrap_or("failed");
                    handle.finish_error(reason);
                }
            }
            RunProgress::StepSkipped { step, result, cause } => {
                let why = match cause {
                    SkipCause::Planned => "up to date".to_string(),
                    SkipCause::Condition => "condition not met".to_string(),
                    SkipCause::PluginMissing => result
                        .error
                        .clone()
                        .unwrap_or_else(|| "plugin missing".to_string()),
                };
                ui.start_spinner(&step.id)
                    .finish_skipped(&format!("{}: {}", step.id, why));
            }
        });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) if e.is_conflict() => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(2));
            }
            Err(e) => return Err(e),
        };

        match outcome {
            RunOutcome::Finished { result, .. } if result.success => {
                let ran = result.step_results.iter().filter(|r| r.ran()).count();
                let mut summary = format!("{} complete: {} step(s) ran", target, ran);
                if !result.usage.is_zero() {
                    summary.push_str(&format!(", {} tokens", result.usage.total));
                }
                ui.success(&summary);
                Ok(CommandResult::success())
            }
            RunOutcome::Finished { result, .. } => {
                let message = result
                    .failure()
                    .and_then(|f| f.error.clone())
                    .unwrap_or_else(|| "Run failed".to_string());
                ui.error(&message);
                Ok(CommandResult::failure(1))
            }
            RunOutcome::Planned(_) => Ok(CommandResult::success()),
        }
    }
}

fn show_plan(ui: &mut dyn UserInterface, plan: &Plan) {
    for step in &plan.steps {
        let marker = if step.run { "▸" } else { "○" };
        ui.message(&format!("  {} {}: {}", marker, step.step, step.reason));
    }
    ui.message("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::mock::SpinnerEvent;
    use crate::ui::MockUI;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("workflow.yml"),
            "id: demo\nsteps:\n  - id: input\n    plugin: builtin.input\n  - id: summary\n    plugin: builtin.write\n    depends_on: [input]\n    config:\n      filename: summary.txt\n      content: ${config.title}\n",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("configs")).unwrap();
        fs::create_dir_all(temp.path().join("inputs")).unwrap();
        fs::write(temp.path().join("configs/r1.json"), r#"{"title": "Hello"}"#).unwrap();
        fs::write(temp.path().join("inputs/r1.csv"), "comment\n").unwrap();
        temp
    }

    fn args(target: &str) -> RunArgs {
        RunArgs {
            target: target.to_string(),
            skip_interaction: true,
            ..Default::default()
        }
    }

    #[test]
    fn runs_then_reports_up_to_date() {
        let temp = project();
        let mut ui = MockUI::new();

        let result = RunCommand::new(temp.path(), None, args("r1"))
            .execute(&mut ui)
            .unwrap();
        assert!(result.success);
        assert_eq!(
            fs::read_to_string(temp.path().join("outputs/r1/summary.txt")).unwrap(),
            "Hello"
        );
        assert!(ui
            .spinner_events()
            .iter()
            .any(|e| matches!(e, SpinnerEvent::Succeeded(m) if m.starts_with("summary"))));

        let mut ui = MockUI::new();
        let result = RunCommand::new(temp.path(), None, args("r1"))
            .execute(&mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.successes().iter().any(|s| s == "Everything is up to date"));
    }

    #[test]
    fn dry_run_only_shows_plan() {
        let temp = project();
        let mut ui = MockUI::new();
        let run_args = RunArgs {
            dry_run: true,
            ..args("r1")
        };

        let result = RunCommand::new(temp.path(), None, run_args)
            .execute(&mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.has_output("no trace of previous run"));
        assert!(!temp.path().join("outputs/r1").exists());
    }

    #[test]
    fn declined_confirmation_runs_nothing() {
        let temp = project();
        let mut ui = MockUI::new();
        ui.set_interactive(true);
        ui.set_confirm_response(false);
        let run_args = RunArgs {
            skip_interaction: false,
            ..args("r1")
        };

        RunCommand::new(temp.path(), None, run_args)
            .execute(&mut ui)
            .unwrap();
        assert_eq!(ui.questions().len(), 1);
        assert!(!temp.path().join("outputs/r1").exists());
    }

    #[test]
    fn missing_config_is_an_error() {
        let temp = project();
        let mut ui = MockUI::new();
        let err = RunCommand::new(temp.path(), None, args("ghost"))
            .execute(&mut ui)
            .unwrap_err();
        assert!(err.to_string().contains("ghost.json"));
    }
}
