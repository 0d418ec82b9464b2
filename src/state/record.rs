//! The per-target run record.
//!
//! A record is rewritten after every step. When a run supersedes an earlier
//! one, the earlier record hangs off [`RunRecord::previous`] until the new
//! run finishes, at which point its completed history is folded into
//! [`RunRecord::previously_completed_steps`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::Usage;
use crate::staleness::StepPlan;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::NotStarted => "not started",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        };
        f.write_str(text)
    }
}

/// Summary of one completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: String,
    pub completed: DateTime<Utc>,
    pub duration_secs: f64,
    /// Parameters the step ran with.
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub usage: Usage,
    /// Produced artifacts, relative to the output directory when under it.
    #[serde(default)]
    pub artifacts: BTreeMap<String, PathBuf>,
}

impl CompletedStep {
    /// Artifact paths made absolute against `output_dir`.
    pub fn resolved_artifacts(&self, output_dir: &Path) -> BTreeMap<String, PathBuf> {
        self.artifacts
            .iter()
            .map(|(name, path)| {
                let path = if path.is_relative() {
                    output_dir.join(path)
                } else {
                    path.clone()
                };
                (name.clone(), path)
            })
            .collect()
    }
}

/// Persisted state of a target's run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunRecord {
    pub target: String,
    #[serde(default)]
    pub workflow: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub current_step_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Heartbeat; a running record past this instant is considered dead.
    #[serde(default)]
    pub lock_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub plan: Vec<StepPlan>,
    #[serde(default)]
    pub completed_steps: Vec<CompletedStep>,
    #[serde(default)]
    pub previously_completed_steps: Vec<CompletedStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Box<RunRecord>>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(target: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workflow: workflow.into(),
            ..Default::default()
        }
    }

    /// Start a run that supersedes `previous`.
    pub fn begin(
        target: impl Into<String>,
        workflow: impl Into<String>,
        previous: Option<RunRecord>,
        plan: Vec<StepPlan>,
    ) -> Self {
        Self {
            status: RunStatus::Running,
            started_at: Some(Utc::now()),
            plan,
            previous: previous.map(Box::new),
            ..Self::new(target, workflow)
        }
    }

    pub fn start_step(&mut self, step: &str) {
        self.current_step = Some(step.to_string());
        self.current_step_started = Some(Utc::now());
    }

    /// Record a finished step and clear the current-step marker.
    pub fn complete_step(
        &mut self,
        step: &str,
        params: Value,
        usage: Usage,
        artifacts: &BTreeMap<String, PathBuf>,
        output_dir: &Path,
    ) {
        let now = Utc::now();
        let duration_secs = match (&self.current_step, self.current_step_started) {
            (Some(current), Some(started)) if current == step => {
                (now - started).num_milliseconds().max(0) as f64 / 1000.0
            }
            _ => 0.0,
        };
        let artifacts = artifacts
            .iter()
            .map(|(name, path)| {
                let stored = path.strip_prefix(output_dir).unwrap_or(path).to_path_buf();
                (name.clone(), stored)
            })
            .collect();

        self.usage += usage;
        self.completed_steps.push(CompletedStep {
            step: step.to_string(),
            completed: now,
            duration_secs,
            params,
            usage,
            artifacts,
        });
        self.current_step = None;
        self.current_step_started = None;
    }

    /// Every completed step this record knows about, newest first.
    ///
    /// Order: own completions, previously completed ones, then the
    /// `previous` chain.
    pub fn history(&self) -> Vec<&CompletedStep> {
        let mut all: Vec<&CompletedStep> = self.completed_steps.iter().rev().collect();
        all.extend(self.previously_completed_steps.iter().rev());
        if let Some(previous) = &self.previous {
            all.extend(previous.history());
        }
        all
    }

    /// Most recent completion of `step`.
    pub fn latest_completion(&self, step: &str) -> Option<&CompletedStep> {
        self.history().into_iter().find(|c| c.step == step)
    }

    /// Close the run, folding the superseded record into this one.
    pub fn finish(&mut self, error: Option<String>) {
        if let Some(previous) = self.previous.take() {
            let fresh: HashSet<&str> = self.completed_steps.iter().map(|c| c.step.as_str()).collect();
            let mut seen = HashSet::new();
            let mut carried: Vec<CompletedStep> = previous
                .history()
                .into_iter()
                .filter(|c| !fresh.contains(c.step.as_str()))
                .filter(|c| seen.insert(c.step.clone()))
                .cloned()
                .collect();
            // history() is newest first; storage is chronological
            carried.reverse();
            self.previously_completed_steps = carried;
        }

        self.status = if error.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };
        self.error = error;
        self.ended_at = Some(Utc::now());
        self.current_step = None;
        self.current_step_started = None;
    }

    /// Push the heartbeat forward.
    pub fn touch(&mut self, heartbeat: Duration) {
        let ahead = chrono::Duration::from_std(heartbeat).unwrap_or(chrono::Duration::zero());
        self.lock_until = Some(Utc::now() + ahead);
    }

    /// Whether a process is presumably still working on this record.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Running && self.lock_until.map(|t| t > now).unwrap_or(false)
    }
}
