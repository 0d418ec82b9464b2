//! Workflow execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::condition::evaluate_condition;
use super::definition::{WorkflowDefinition, WorkflowStep};
use super::resolver;
use super::result::{StepResult, WorkflowResult};
use super::template::resolve_template;
use crate::error::{PipewrightError, Result};
use crate::plugin::{PluginRegistry, StepContext, StepInputs};
use crate::staleness::Plan;

/// Why a step was skipped without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    /// The staleness plan decided the step is up to date.
    Planned,
    /// The step's condition evaluated to false.
    Condition,
    /// An optional step whose plugin is not registered.
    PluginMissing,
}

/// Progress events emitted during workflow execution.
#[derive(Debug)]
pub enum RunProgress<'a> {
    /// A step is about to be validated and run.
    StepStarting {
        step: &'a WorkflowStep,
        index: usize,
        total: usize,
    },
    /// A step was attempted. `result` says whether it succeeded.
    StepFinished {
        step: &'a WorkflowStep,
        result: &'a StepResult,
        /// The resolved configuration the step was given.
        params: &'a Value,
        duration: Duration,
    },
    /// A step was not attempted.
    StepSkipped {
        step: &'a WorkflowStep,
        result: &'a StepResult,
        cause: SkipCause,
    },
}

/// Runs workflows against a plugin registry.
pub struct WorkflowEngine<'a> {
    registry: &'a PluginRegistry,
    plan: Option<&'a Plan>,
    reused: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self {
            registry,
            plan: None,
            reused: BTreeMap::new(),
        }
    }

    /// Skip steps the plan marks as up to date.
    pub fn with_plan(mut self, plan: &'a Plan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Artifacts (per step) republished when a planned-out step is skipped.
    pub fn with_reused_artifacts(mut self, reused: BTreeMap<String, BTreeMap<String, PathBuf>>) -> Self {
        self.reused = reused;
        self
    }

    pub fn run(
        &self,
        workflow: &WorkflowDefinition,
        config: &Value,
        ctx: &StepContext,
    ) -> Result<WorkflowResult> {
        self.run_with_progress(workflow, config, ctx, |_| Ok(()))
    }

    /// Run the workflow, reporting each step to `on_progress`.
    ///
    /// Structural problems and a missing required plugin are errors. A
    /// failing required step ends the run with `success == false` and no
    /// further steps attempted. An error returned by `on_progress` aborts
    /// the run.
    pub fn run_with_progress(
        &self,
        workflow: &WorkflowDefinition,
        config: &Value,
        ctx: &StepContext,
        mut on_progress: impl FnMut(RunProgress<'_>) -> Result<()>,
    ) -> Result<WorkflowResult> {
        let errors = resolver::validate(workflow);
        if !errors.is_empty() {
            return Err(PipewrightError::Validation { errors });
        }
        let order = resolver::order(workflow)?;
        let total = order.len();

        let mut result = WorkflowResult::new(&workflow.id);
        let mut pool: BTreeMap<String, PathBuf> = BTreeMap::new();

        for (index, step_id) in order.iter().enumerate() {
            let Some(step) = workflow.get_step(step_id) else {
                continue;
            };

            if self.plan.map(|p| !p.should_run(step_id)).unwrap_or(false) {
                if let Some(artifacts) = self.reused.get(step_id) {
                    pool.extend(artifacts.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                debug!("Skipping {}: up to date", step_id);
                result.step_results.push(StepResult::skipped(step_id));
                report_skip(&result, step, SkipCause::Planned, &mut on_progress)?;
                continue;
            }

            if !evaluate_condition(step.condition.as_deref(), config, &result.step_results) {
                debug!("Skipping {}: condition is false", step_id);
                result.step_results.push(StepResult::skipped(step_id));
                report_skip(&result, step, SkipCause::Condition, &mut on_progress)?;
                continue;
            }

            let plugin = match self.registry.get_or_none(&step.plugin) {
                Some(plugin) => plugin,
                None if step.optional => {
                    warn!("Plugin '{}' not found, skipping optional step {}", step.plugin, step_id);
                    result.step_results.push(StepResult::skipped_with_error(
                        step_id,
                        true,
                        format!("Plugin '{}' not found (optional step)", step.plugin),
                    ));
                    report_skip(&result, step, SkipCause::PluginMissing, &mut on_progress)?;
                    continue;
                }
                None => {
                    return Err(PipewrightError::StepPluginMissing {
                        step: step_id.clone(),
                        plugin: step.plugin.clone(),
                    })
                }
            };

            on_progress(RunProgress::StepStarting { step, index, total })?;
            let start = Instant::now();

            let artifacts = plugin
                .metadata()
                .inputs
                .iter()
                .filter_map(|name| pool.get(name).map(|path| (name.clone(), path.clone())))
                .collect();
            let inputs = StepInputs {
                artifacts,
                config: config.clone(),
            };
            let params = resolve_template(&step.config, config);

            let mut problems = plugin.validate_inputs(&inputs);
            problems.extend(plugin.validate_config(&params));

            let outcome = if !problems.is_empty() {
                Err(PipewrightError::StepValidation {
                    step: step_id.clone(),
                    errors: problems,
                })
            } else {
                info!("Running step {} ({})", step_id, step.plugin);
                plugin
                    .run(ctx, &inputs, &params)
                    .map_err(|e| PipewrightError::StepExecution {
                        step: step_id.clone(),
                        message: format!("{:#}", e),
                    })
            };

            let step_result = match outcome {
                Ok(outputs) => {
                    pool.extend(outputs.artifacts.iter().map(|(k, v)| (k.clone(), v.clone())));
                    result.usage += outputs.usage;
                    StepResult::completed(step_id, outputs)
                }
                Err(e) if step.optional => {
                    warn!("Optional step {} skipped: {}", step_id, e);
                    StepResult::skipped_with_error(step_id, false, e.to_string())
                }
                Err(e) => {
                    warn!("{}", e);
                    result.success = false;
                    StepResult::failed(step_id, e.to_string())
                }
            };
            let stop = !step_result.success && !step_result.skipped;
            result.step_results.push(step_result);

            if let Some(last) = result.step_results.last() {
                on_progress(RunProgress::StepFinished {
                    step,
                    result: last,
                    params: &params,
                    duration: start.elapsed(),
                })?;
            }
            if stop {
                break;
            }
        }

        Ok(result)
    }
}

fn report_skip(
    result: &WorkflowResult,
    step: &WorkflowStep,
    cause: SkipCause,
    on_progress: &mut impl FnMut(RunProgress<'_>) -> Result<()>,
) -> Result<()> {
    match result.step_results.last() {
        Some(last) => on_progress(RunProgress::StepSkipped {
            step,
            result: last,
            cause,
        }),
        None => Ok(()),
    }
}
