//! Results of executing steps and workflows.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::plugin::{StepOutputs, Usage};

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<StepOutputs>,
}

impl StepResult {
    pub fn completed(step_id: impl Into<String>, outputs: StepOutputs) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            skipped: false,
            error: None,
            outputs: Some(outputs),
        }
    }

    /// Skipped without error (condition false, or planned not to run).
    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            skipped: true,
            error: None,
            outputs: None,
        }
    }

    /// An optional step that could not run.
    pub fn skipped_with_error(step_id: impl Into<String>, success: bool, error: String) -> Self {
        Self {
            step_id: step_id.into(),
            success,
            skipped: true,
            error: Some(error),
            outputs: None,
        }
    }

    /// A required step that failed.
    pub fn failed(step_id: impl Into<String>, error: String) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            skipped: false,
            error: Some(error),
            outputs: None,
        }
    }

    /// Whether the step actually ran to completion.
    pub fn ran(&self) -> bool {
        self.success && !self.skipped
    }
}

/// Outcome of a whole workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    /// False as soon as any required step fails.
    pub success: bool,
    /// Results in execution order. Steps never reached are absent.
    pub step_results: Vec<StepResult>,
    pub usage: Usage,
}

impl WorkflowResult {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            success: true,
            step_results: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    /// Every produced artifact, keyed `<step>.<artifact>`.
    pub fn artifacts(&self) -> BTreeMap<String, PathBuf> {
        self.step_results
            .iter()
            .filter_map(|r| r.outputs.as_ref().map(|o| (&r.step_id, o)))
            .flat_map(|(step, outputs)| {
                outputs
                    .artifacts
                    .iter()
                    .map(move |(name, path)| (format!("{}.{}", step, name), path.clone()))
            })
            .collect()
    }

    /// The first failed step, if any.
    pub fn failure(&self) -> Option<&StepResult> {
        self.step_results.iter().find(|r| !r.success && !r.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_are_qualified_by_step() {
        let mut result = WorkflowResult::new("w");
        result.step_results.push(StepResult::completed(
            "extraction",
            StepOutputs::new().with_artifact("args", "/out/args.csv"),
        ));
        result.step_results.push(StepResult::skipped("visualization"));

        let artifacts = result.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(
            artifacts.get("extraction.args"),
            Some(&PathBuf::from("/out/args.csv"))
        );
    }

    #[test]
    fn failure_ignores_skipped_errors() {
        let mut result = WorkflowResult::new("w");
        result
            .step_results
            .push(StepResult::skipped_with_error("opt", false, "boom".into()));
        assert!(result.failure().is_none());

        result
            .step_results
            .push(StepResult::failed("req", "bad".into()));
        assert_eq!(result.failure().map(|r| r.step_id.as_str()), Some("req"));
    }

    #[test]
    fn ran_only_for_completed_steps() {
        assert!(StepResult::completed("a", StepOutputs::new()).ran());
        assert!(!StepResult::skipped("a").ran());
        assert!(!StepResult::failed("a", "x".into()).ran());
    }
}
