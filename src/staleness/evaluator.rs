//! Decides which steps of an incremental run must execute.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::spec::StepSpec;
use crate::error::Result;
use crate::state::{CompletedStep, RunRecord};
use crate::workflow::DependencyGraph;

/// Caller switches that override the change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Run every step.
    pub force: bool,
    /// Run exactly this step.
    pub only: Option<String>,
    /// Do not run the rendering step.
    pub skip_rendering: bool,
    /// Id of the step that renders presentation output.
    pub rendering_step: Option<String>,
}

/// Why a step will or will not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "steps", rename_all = "snake_case")]
pub enum PlanReason {
    RenderingDisabled,
    Forced,
    AnotherStepForced,
    ForcedThisStep,
    NoPreviousRun,
    PreviousDataMissing,
    DependencyWillRerun(Vec<String>),
    ParametersChanged(Vec<String>),
    NothingChanged,
}

impl fmt::Display for PlanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanReason::RenderingDisabled => write!(f, "rendering disabled"),
            PlanReason::Forced => write!(f, "forced"),
            PlanReason::AnotherStepForced => write!(f, "another step was forced"),
            PlanReason::ForcedThisStep => write!(f, "forced this step"),
            PlanReason::NoPreviousRun => write!(f, "no trace of previous run"),
            PlanReason::PreviousDataMissing => write!(f, "previous data not found"),
            PlanReason::DependencyWillRerun(steps) => {
                write!(f, "a dependency will re-run: {}", steps.join(", "))
            }
            PlanReason::ParametersChanged(keys) => {
                write!(f, "parameters changed: {}", keys.join(", "))
            }
            PlanReason::NothingChanged => write!(f, "nothing changed"),
        }
    }
}

/// Decision for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPlan {
    pub step: String,
    pub run: bool,
    pub reason: PlanReason,
}

/// Decisions for every step, in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<StepPlan>,
}

impl Plan {
    pub fn get(&self, step: &str) -> Option<&StepPlan> {
        self.steps.iter().find(|p| p.step == step)
    }

    /// Steps without a decision run.
    pub fn should_run(&self, step: &str) -> bool {
        self.get(step).map(|p| p.run).unwrap_or(true)
    }

    pub fn to_run(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|p| p.run)
            .map(|p| p.step.as_str())
            .collect()
    }

    pub fn into_steps(self) -> Vec<StepPlan> {
        self.steps
    }
}

/// Plan an incremental run.
///
/// `current` maps step ids to the parameters the step would run with now;
/// `output_dir` is the target's output directory. Rules are applied per
/// step in order and the first match decides.
pub fn plan(
    specs: &[StepSpec],
    current: &HashMap<String, Value>,
    previous: Option<&RunRecord>,
    output_dir: &Path,
    options: &PlanOptions,
) -> Result<Plan> {
    let graph = DependencyGraph::from_edges(
        specs
            .iter()
            .map(|s| (s.step.as_str(), s.dependencies.steps.as_slice())),
    );
    let order = graph.topological_order()?;
    let history: Vec<&CompletedStep> = previous.map(|r| r.history()).unwrap_or_default();
    let empty = Value::Object(Default::default());

    let mut decisions: Vec<StepPlan> = Vec::with_capacity(order.len());
    for step in &order {
        let Some(spec) = specs.iter().find(|s| &s.step == step) else {
            continue;
        };
        let latest = history.iter().copied().find(|c| &c.step == step);
        let params = current.get(step).unwrap_or(&empty);

        let (run, reason) = decide(spec, latest, params, &graph, &decisions, output_dir, options);
        debug!("Plan {}: run={} ({})", step, run, reason);
        decisions.push(StepPlan {
            step: step.clone(),
            run,
            reason,
        });
    }

    Ok(Plan { steps: decisions })
}

fn decide(
    spec: &StepSpec,
    latest: Option<&CompletedStep>,
    params: &Value,
    graph: &DependencyGraph,
    decided: &[StepPlan],
    output_dir: &Path,
    options: &PlanOptions,
) -> (bool, PlanReason) {
    let step = spec.step.as_str();

    if options.skip_rendering && options.rendering_step.as_deref() == Some(step) {
        return (false, PlanReason::RenderingDisabled);
    }
    if options.force {
        return (true, PlanReason::Forced);
    }
    if let Some(only) = &options.only {
        return if only == step {
            (true, PlanReason::ForcedThisStep)
        } else {
            (false, PlanReason::AnotherStepForced)
        };
    }
    let Some(latest) = latest else {
        return (true, PlanReason::NoPreviousRun);
    };
    if !outputs_present(spec, latest, output_dir) {
        return (true, PlanReason::PreviousDataMissing);
    }

    let upstream = graph.transitive_dependencies(step);
    let rerunning: Vec<String> = decided
        .iter()
        .filter(|p| p.run && upstream.contains(&p.step))
        .map(|p| p.step.clone())
        .collect();
    if !rerunning.is_empty() {
        return (true, PlanReason::DependencyWillRerun(rerunning));
    }

    let changed = changed_params(spec, &latest.params, params);
    if !changed.is_empty() {
        return (true, PlanReason::ParametersChanged(changed));
    }
    (false, PlanReason::NothingChanged)
}

fn outputs_present(spec: &StepSpec, latest: &CompletedStep, output_dir: &Path) -> bool {
    match &spec.filename {
        Some(filename) => output_dir.join(filename).exists(),
        None => latest
            .resolved_artifacts(output_dir)
            .values()
            .all(|path| path.exists()),
    }
}

fn changed_params(spec: &StepSpec, previous: &Value, current: &Value) -> Vec<String> {
    spec.watched_params()
        .into_iter()
        .filter(|key| {
            let before = previous.get(key).unwrap_or(&Value::Null);
            let after = current.get(key).unwrap_or(&Value::Null);
            if before != after {
                debug!(
                    "{} parameter '{}' changed from {} to {}",
                    spec.step, key, before, after
                );
                true
            } else {
                false
            }
        })
        .collect()
}
