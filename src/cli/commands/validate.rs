//! Validate command implementation.
//!
//! The `pipewright validate` command checks the workflow structure and that
//! every step's plugin is available, without running anything.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cli::args::ValidateArgs;
use crate::error::{PipewrightError, Result};
use crate::plugin::PluginRegistry;
use crate::ui::UserInterface;
use crate::workflow::{order, validate, WorkflowDefinition};

use super::context::ProjectContext;
use super::dispatcher::{Command, CommandResult};

/// Findings of a validation pass.
#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Execution order, when the workflow is valid.
    pub order: Vec<String>,
}

/// Check `workflow` against the plugins in `registry`.
pub fn check_workflow(workflow: &WorkflowDefinition, registry: &PluginRegistry) -> ValidationReport {
    let mut report = ValidationReport {
        errors: validate(workflow),
        ..Default::default()
    };
    for step in &workflow.steps {
        if registry.contains(&step.plugin) {
            continue;
        }
        let message = format!("Step '{}' uses unknown plugin '{}'", step.id, step.plugin);
        if step.optional {
            report.warnings.push(message);
        } else {
            report.errors.push(message);
        }
    }
    if report.errors.is_empty() {
        match order(workflow) {
            Ok(order) => report.order = order,
            Err(e) => report.errors.push(e.to_string()),
        }
    }
    report.valid = report.errors.is_empty();
    report
}

/// The validate command implementation.
pub struct ValidateCommand {
    project_root: PathBuf,
    settings_path: Option<PathBuf>,
    args: ValidateArgs,
}

impl ValidateCommand {
    pub fn new(project_root: &Path, settings_path: Option<&Path>, args: ValidateArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            settings_path: settings_path.map(Path::to_path_buf),
            args,
        }
    }
}

impl Command for ValidateCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = ProjectContext::load(&self.project_root, self.settings_path.as_deref())?;
        let workflow = match ctx.workflow(self.args.workflow.as_deref()) {
            Ok(w) => w,
            Err(e @ PipewrightError::ConfigNotFound { .. }) => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(2));
            }
            Err(e) => return Err(e),
        };
        let (registry, loaded) = ctx.registry()?;

        let mut report = check_workflow(&workflow, &registry);
        report
            .warnings
            .extend(loaded.failures.iter().map(|f| f.to_string()));

        if self.args.json {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| anyhow::anyhow!("Failed to serialize report: {}", e))?;
            println!("{}", json);
        } else {
            for warning in &report.warnings {
                ui.warning(warning);
            }
            for error in &report.errors {
                ui.error(error);
            }
            if report.valid {
                ui.success(&format!(
                    "Workflow '{}' is valid ({} steps: {})",
                    workflow.id,
                    report.order.len(),
                    report.order.join(" → ")
                ));
            }
        }

        if report.valid {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::register_builtins;
    use crate::workflow::WorkflowStep;

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        register_builtins(&registry).unwrap();
        registry
    }

    #[test]
    fn valid_workflow_reports_order() {
        let wf = WorkflowDefinition::new("w", "1.0.0")
            .with_step(WorkflowStep::new("b", "builtin.write").depends_on(["a"]))
            .with_step(WorkflowStep::new("a", "builtin.input"));
        let report = check_workflow(&wf, &registry());
        assert!(report.valid);
        assert_eq!(report.order, vec!["a", "b"]);
    }

    #[test]
    fn unknown_plugin_is_error_unless_optional() {
        let wf = WorkflowDefinition::new("w", "1.0.0")
            .with_step(WorkflowStep::new("a", "acme.nope"))
            .with_step(WorkflowStep::new("b", "acme.maybe").optional());
        let report = check_workflow(&wf, &registry());
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Step 'a' uses unknown plugin 'acme.nope'"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn cycle_is_reported() {
        let wf = WorkflowDefinition::new("w", "1.0.0")
            .with_step(WorkflowStep::new("a", "builtin.input").depends_on(["b"]))
            .with_step(WorkflowStep::new("b", "builtin.input").depends_on(["a"]));
        let report = check_workflow(&wf, &registry());
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("a") && e.contains("b")));
        assert!(report.order.is_empty());
    }
}
