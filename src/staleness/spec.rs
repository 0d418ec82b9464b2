//! Step specifications the staleness evaluator plans over.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipewrightError, Result};
use crate::plugin::PluginRegistry;
use crate::workflow::{resolve_template, WorkflowDefinition};

/// Keys watched in addition to the declared ones for steps that call an
/// external model.
const LLM_PARAMS: [&str; 2] = ["prompt", "model"];

/// What a step depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecDependencies {
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
}

/// One step as the evaluator sees it.
///
/// Deserializes from the step-spec JSON format:
/// `{"step", "filename", "dependencies": {"steps", "params"}, "use_llm"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub step: String,
    /// Output file, relative to the target's output directory. When absent
    /// the artifacts recorded by the last completion are checked instead.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub dependencies: SpecDependencies,
    #[serde(default)]
    pub use_llm: bool,
}

impl StepSpec {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            filename: None,
            dependencies: SpecDependencies::default(),
            use_llm: false,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_llm(mut self, use_llm: bool) -> Self {
        self.use_llm = use_llm;
        self
    }

    /// Parameter keys compared against the previous run.
    pub fn watched_params(&self) -> Vec<String> {
        let mut keys = self.dependencies.params.clone();
        if self.use_llm {
            for key in LLM_PARAMS {
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.to_string());
                }
            }
        }
        keys
    }
}

/// Read a step-spec JSON list.
pub fn load_specs(path: &Path) -> Result<Vec<StepSpec>> {
    if !path.exists() {
        return Err(PipewrightError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| PipewrightError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Derive specs from a workflow: every top-level key of a step's config
/// template is watched, and `depends_on` becomes the step dependencies.
pub fn specs_from_workflow(
    workflow: &WorkflowDefinition,
    registry: Option<&PluginRegistry>,
) -> Vec<StepSpec> {
    workflow
        .steps
        .iter()
        .map(|step| {
            let params: Vec<String> = step
                .config
                .as_object()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
            let use_llm = registry
                .and_then(|r| r.get_or_none(&step.plugin))
                .map(|p| p.metadata().uses_external_service)
                .unwrap_or(false);
            StepSpec::new(&step.id)
                .with_steps(step.depends_on.clone())
                .with_params(params)
                .with_llm(use_llm)
        })
        .collect()
}

/// Current parameters taken from `config[<step>]`.
pub fn params_from_config(config: &Value, specs: &[StepSpec]) -> HashMap<String, Value> {
    specs
        .iter()
        .map(|spec| {
            let params = config
                .get(&spec.step)
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            (spec.step.clone(), params)
        })
        .collect()
}

/// Current parameters as each step's resolved config template.
pub fn params_from_workflow(workflow: &WorkflowDefinition, config: &Value) -> HashMap<String, Value> {
    workflow
        .steps
        .iter()
        .map(|step| (step.id.clone(), resolve_template(&step.config, config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStep;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parses_step_spec_json() {
        let json = r#"[
            {"step": "extraction", "filename": "args.csv",
             "dependencies": {"params": ["limit"], "steps": []}, "use_llm": true},
            {"step": "embedding", "filename": "embeddings.pkl",
             "dependencies": {"params": ["model"], "steps": ["extraction"]}}
        ]"#;
        let specs: Vec<StepSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].use_llm);
        assert_eq!(specs[1].dependencies.steps, vec!["extraction"]);
    }

    #[test]
    fn llm_steps_watch_prompt_and_model() {
        let spec = StepSpec::new("labelling").with_params(["sampling_num", "model"]).with_llm(true);
        assert_eq!(spec.watched_params(), vec!["sampling_num", "model", "prompt"]);

        let spec = StepSpec::new("clustering").with_params(["cluster_nums"]);
        assert_eq!(spec.watched_params(), vec!["cluster_nums"]);
    }

    #[test]
    fn load_specs_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("specs.json");
        fs::write(&path, r#"[{"step": "a"}]"#).unwrap();
        let specs = load_specs(&path).unwrap();
        assert_eq!(specs, vec![StepSpec::new("a")]);

        fs::write(&path, "{").unwrap();
        assert!(matches!(
            load_specs(&path),
            Err(PipewrightError::ConfigParseError { .. })
        ));
        assert!(matches!(
            load_specs(&temp.path().join("none.json")),
            Err(PipewrightError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn specs_derive_from_workflow() {
        let wf = WorkflowDefinition::new("w", "1.0.0")
            .with_step(WorkflowStep::new("a", "x.a").with_config(json!({"limit": "${config.a.limit}"})))
            .with_step(WorkflowStep::new("b", "x.b").depends_on(["a"]));
        let specs = specs_from_workflow(&wf, None);

        assert_eq!(specs[0].dependencies.params, vec!["limit"]);
        assert_eq!(specs[1].dependencies.steps, vec!["a"]);
        assert!(specs[1].dependencies.params.is_empty());
    }

    #[test]
    fn current_params() {
        let config = json!({"a": {"limit": 5}});
        let specs = vec![StepSpec::new("a"), StepSpec::new("b")];
        let params = params_from_config(&config, &specs);
        assert_eq!(params["a"], json!({"limit": 5}));
        assert_eq!(params["b"], json!({}));

        let wf = WorkflowDefinition::new("w", "1.0.0")
            .with_step(WorkflowStep::new("a", "x.a").with_config(json!({"limit": "${config.a.limit}"})));
        assert_eq!(params_from_workflow(&wf, &config)["a"], json!({"limit": 5}));
    }
}
