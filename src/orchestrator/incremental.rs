//! Incremental runs of a workflow for one target.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ConflictReason, PipewrightError, Result};
use crate::lock::TargetLayout;
use crate::plugin::{PluginRegistry, StepContext, Usage};
use crate::staleness::{self, Plan, PlanOptions, StepSpec};
use crate::state::{RunRecord, RunStateStore, RunStatus, TargetIndex};
use crate::workflow::{resolver, RunProgress, WorkflowDefinition, WorkflowEngine, WorkflowResult};

/// What a run produced.
#[derive(Debug)]
pub enum RunOutcome {
    /// Dry run: the plan, nothing executed or written.
    Planned(Plan),
    /// The workflow was executed.
    Finished { plan: Plan, result: WorkflowResult },
}

impl RunOutcome {
    pub fn plan(&self) -> &Plan {
        match self {
            RunOutcome::Planned(plan) => plan,
            RunOutcome::Finished { plan, .. } => plan,
        }
    }

    pub fn result(&self) -> Option<&WorkflowResult> {
        match self {
            RunOutcome::Planned(_) => None,
            RunOutcome::Finished { result, .. } => Some(result),
        }
    }
}

/// Runs workflows incrementally, persisting the run record as it goes.
pub struct Orchestrator<'a> {
    registry: &'a PluginRegistry,
    layout: &'a TargetLayout,
    heartbeat: Duration,
    specs: Option<Vec<StepSpec>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a PluginRegistry, layout: &'a TargetLayout, heartbeat: Duration) -> Self {
        Self {
            registry,
            layout,
            heartbeat,
            specs: None,
        }
    }

    /// Plan with explicit step specs instead of deriving them from the
    /// workflow. Current parameters then come from `config[<step>]`.
    pub fn with_specs(mut self, specs: Vec<StepSpec>) -> Self {
        self.specs = Some(specs);
        self
    }

    /// Plan a run without executing anything.
    pub fn plan(
        &self,
        workflow: &WorkflowDefinition,
        target: &str,
        options: &PlanOptions,
    ) -> Result<Plan> {
        match self.run(workflow, target, options, true, |_| {})? {
            RunOutcome::Planned(plan) | RunOutcome::Finished { plan, .. } => Ok(plan),
        }
    }

    /// Run `workflow` for `target`.
    ///
    /// The run record is saved after every step, so an abort leaves it
    /// reflecting exactly the steps that completed. A failing step makes the
    /// record `error` but still returns the result; structural problems and
    /// collaborator failures are returned as errors after the record is
    /// closed.
    pub fn run(
        &self,
        workflow: &WorkflowDefinition,
        target: &str,
        options: &PlanOptions,
        dry_run: bool,
        mut on_progress: impl FnMut(&RunProgress<'_>),
    ) -> Result<RunOutcome> {
        TargetLayout::validate_target(target)?;
        let errors = resolver::validate(workflow);
        if !errors.is_empty() {
            return Err(PipewrightError::Validation { errors });
        }

        let config = load_run_config(&self.layout.config_path(target))?;
        let output_dir = self.layout.output_dir(target);
        let store = RunStateStore::new(&output_dir, self.heartbeat);

        let prior = store.load()?;
        if prior.as_ref().map(|r| r.is_live(Utc::now())).unwrap_or(false) {
            return Err(PipewrightError::LockConflict {
                target: target.to_string(),
                reason: ConflictReason::RunInProgress,
            });
        }

        let (specs, current) = self.current_params(workflow, &config);
        let plan = staleness::plan(&specs, &current, prior.as_ref(), &output_dir, options)?;
        if dry_run {
            return Ok(RunOutcome::Planned(plan));
        }

        fs::create_dir_all(&output_dir)?;
        store.archive()?;
        let reused = reused_artifacts(&plan, prior.as_ref(), &output_dir);

        let index = TargetIndex::new(&self.layout.output_root);
        let mut record = RunRecord::begin(target, &workflow.id, prior, plan.steps.clone());
        store.save(&mut record)?;
        index.set_status(target, RunStatus::Running)?;
        info!("Running {} for {}: {} step(s) to run", workflow.id, target, plan.to_run().len());

        let ctx = StepContext::from_config(&config, &output_dir, &self.layout.input_dir, target);
        let engine = WorkflowEngine::new(self.registry)
            .with_plan(&plan)
            .with_reused_artifacts(reused);

        let outcome = engine.run_with_progress(workflow, &config, &ctx, |event| {
            match &event {
                RunProgress::StepStarting { step, .. } => {
                    record.start_step(&step.id);
                    store.save(&mut record)?;
                }
                RunProgress::StepFinished { step, result, params, .. } if result.ran() => {
                    let recorded = current
                        .get(&step.id)
                        .cloned()
                        .unwrap_or_else(|| (*params).clone());
                    let (usage, artifacts) = result
                        .outputs
                        .as_ref()
                        .map(|o| (o.usage, o.artifacts.clone()))
                        .unwrap_or((Usage::default(), BTreeMap::new()));
                    record.complete_step(&step.id, recorded, usage, &artifacts, &output_dir);
                    store.save(&mut record)?;
                }
                _ => {}
            }
            on_progress(&event);
            Ok(())
        });

        match outcome {
            Ok(result) => {
                let error = result.failure().map(|f| {
                    f.error
                        .clone()
                        .unwrap_or_else(|| format!("Step '{}' failed", f.step_id))
                });
                record.finish(error);
                store.save(&mut record)?;
                index.set_status(target, record.status)?;
                info!("Run of {} finished: {}", target, record.status);
                Ok(RunOutcome::Finished { plan, result })
            }
            Err(e) => {
                record.finish(Some(e.to_string()));
                if let Err(save_err) = store.save(&mut record) {
                    warn!("Failed to save run record for {}: {}", target, save_err);
                }
                if let Err(index_err) = index.set_status(target, RunStatus::Error) {
                    warn!("Failed to update index for {}: {}", target, index_err);
                }
                Err(e)
            }
        }
    }

    fn current_params(
        &self,
        workflow: &WorkflowDefinition,
        config: &Value,
    ) -> (Vec<StepSpec>, HashMap<String, Value>) {
        match &self.specs {
            Some(specs) => (specs.clone(), staleness::params_from_config(config, specs)),
            None => (
                staleness::specs_from_workflow(workflow, Some(self.registry)),
                staleness::params_from_workflow(workflow, config),
            ),
        }
    }
}

/// Read a target's run configuration (a JSON document).
pub fn load_run_config(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipewrightError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            PipewrightError::Io(e)
        }
    })?;
    serde_json::from_str(&content).map_err(|e| PipewrightError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn reused_artifacts(
    plan: &Plan,
    prior: Option<&RunRecord>,
    output_dir: &Path,
) -> BTreeMap<String, BTreeMap<String, PathBuf>> {
    let Some(prior) = prior else {
        return BTreeMap::new();
    };
    plan.steps
        .iter()
        .filter(|p| !p.run)
        .filter_map(|p| {
            let completion = prior.latest_completion(&p.step)?;
            debug!("Reusing artifacts of {}", p.step);
            Some((p.step.clone(), completion.resolved_artifacts(output_dir)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{FnPlugin, PluginMetadata, StepOutputs};
    use crate::staleness::PlanReason;
    use crate::workflow::WorkflowStep;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        layout: TargetLayout,
        registry: PluginRegistry,
        calls: Arc<AtomicUsize>,
    }

    fn writer(id: &str, inputs: &[&str], output: &str, calls: Arc<AtomicUsize>) -> FnPlugin {
        let output = output.to_string();
        FnPlugin::new(
            PluginMetadata::new(id, "1.0.0")
                .with_inputs(inputs.iter().copied())
                .with_outputs([output.clone()]),
            move |ctx, _, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                let path = ctx.output_dir.join(format!("{}.json", output));
                fs::write(&path, "{}")?;
                Ok(StepOutputs::new().with_artifact(output.clone(), path))
            },
        )
    }

    fn fixture(config: Value) -> Fixture {
        let temp = TempDir::new().unwrap();
        let layout = TargetLayout::new(
            temp.path().join("outputs"),
            temp.path().join("inputs"),
            temp.path().join("configs"),
            "csv",
        );
        fs::create_dir_all(&layout.config_dir).unwrap();
        fs::write(layout.config_path("r1"), config.to_string()).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(writer("t.extract", &[], "args", calls.clone())))
            .unwrap();
        registry
            .register(Arc::new(writer("t.embed", &["args"], "vectors", calls.clone())))
            .unwrap();
        Fixture {
            _temp: temp,
            layout,
            registry,
            calls,
        }
    }

    fn workflow() -> WorkflowDefinition {
        WorkflowDefinition::new("w", "1.0.0")
            .with_step(
                WorkflowStep::new("extract", "t.extract")
                    .with_config(json!({"limit": "${config.limit}"})),
            )
            .with_step(WorkflowStep::new("embed", "t.embed").depends_on(["extract"]))
    }

    #[test]
    fn first_run_executes_everything_and_persists() {
        let f = fixture(json!({"limit": 10}));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));

        let outcome = orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |_| {})
            .unwrap();
        assert!(outcome.result().unwrap().success);
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);

        let record = RunStateStore::new(f.layout.output_dir("r1"), Duration::ZERO)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.completed_steps.len(), 2);
        assert_eq!(record.completed_steps[0].params, json!({"limit": 10}));
        assert_eq!(
            record.completed_steps[0].artifacts.get("args"),
            Some(&PathBuf::from("args.json"))
        );

        let entry = TargetIndex::new(&f.layout.output_root).get("r1").unwrap().unwrap();
        assert_eq!(entry.status, RunStatus::Completed);
    }

    #[test]
    fn second_run_skips_unchanged_steps() {
        let f = fixture(json!({"limit": 10}));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));
        orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |_| {})
            .unwrap();

        let outcome = orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |_| {})
            .unwrap();
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
        assert!(outcome.plan().steps.iter().all(|p| !p.run));
        assert!(outcome.result().unwrap().success);

        let store = RunStateStore::new(f.layout.output_dir("r1"), Duration::ZERO);
        let record = store.load().unwrap().unwrap();
        assert!(record.completed_steps.is_empty());
        assert_eq!(record.previously_completed_steps.len(), 2);
        assert_eq!(store.archived().unwrap().len(), 1);
    }

    #[test]
    fn changed_parameter_reruns_step_and_dependents() {
        let f = fixture(json!({"limit": 10}));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));
        orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |_| {})
            .unwrap();

        fs::write(f.layout.config_path("r1"), json!({"limit": 20}).to_string()).unwrap();
        let plan = orchestrator
            .plan(&workflow(), "r1", &PlanOptions::default())
            .unwrap();
        assert_eq!(
            plan.get("extract").unwrap().reason,
            PlanReason::ParametersChanged(vec!["limit".to_string()])
        );
        assert_eq!(
            plan.get("embed").unwrap().reason,
            PlanReason::DependencyWillRerun(vec!["extract".to_string()])
        );
    }

    #[test]
    fn dry_run_writes_nothing() {
        let f = fixture(json!({}));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));
        let outcome = orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), true, |_| {})
            .unwrap();

        assert!(outcome.result().is_none());
        assert_eq!(outcome.plan().to_run(), vec!["extract", "embed"]);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert!(!f.layout.output_dir("r1").exists());
    }

    #[test]
    fn live_record_refuses_new_run() {
        let f = fixture(json!({}));
        let store = RunStateStore::new(f.layout.output_dir("r1"), Duration::from_secs(300));
        let mut record = RunRecord::begin("r1", "w", None, Vec::new());
        store.save(&mut record).unwrap();

        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));
        let err = orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("a run is already in progress"));
        match err {
            PipewrightError::LockConflict { reason, .. } => {
                assert_eq!(reason, ConflictReason::RunInProgress)
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn failing_step_marks_record_error() {
        let f = fixture(json!({}));
        f.registry.register_or_replace(Arc::new(FnPlugin::new(
            PluginMetadata::new("t.embed", "1.0.0"),
            |_, _, _| anyhow::bail!("model unavailable"),
        )));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));

        let outcome = orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |_| {})
            .unwrap();
        assert!(!outcome.result().unwrap().success);

        let record = RunStateStore::new(f.layout.output_dir("r1"), Duration::ZERO)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RunStatus::Error);
        assert!(record.error.unwrap().contains("model unavailable"));
        assert_eq!(record.completed_steps.len(), 1);
        assert_eq!(record.completed_steps[0].step, "extract");
    }

    #[test]
    fn progress_reaches_caller() {
        let f = fixture(json!({}));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));
        let mut started = Vec::new();
        orchestrator
            .run(&workflow(), "r1", &PlanOptions::default(), false, |event| {
                if let RunProgress::StepStarting { step, .. } = event {
                    started.push(step.id.clone());
                }
            })
            .unwrap();
        assert_eq!(started, vec!["extract", "embed"]);
    }

    #[test]
    fn missing_run_config_is_reported() {
        let f = fixture(json!({}));
        let orchestrator = Orchestrator::new(&f.registry, &f.layout, Duration::from_secs(60));
        let err = orchestrator
            .run(&workflow(), "other", &PlanOptions::default(), false, |_| {})
            .unwrap_err();
        assert!(matches!(err, PipewrightError::ConfigNotFound { .. }));
    }
}
