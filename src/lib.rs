//! Pipewright - incremental, plugin-driven pipeline orchestration.
//!
//! A workflow is a set of steps, each backed by a plugin, wired together by
//! dependencies. Pipewright orders the steps, decides which ones are stale
//! for a target, runs those, and records what happened so the next run can
//! skip work that is still valid.
//!
//! # Modules
//!
//! - [`plugin`] - Plugin contract, registry, and loader
//! - [`workflow`] - Workflow definitions, dependency resolution, and the engine
//! - [`staleness`] - Deciding which steps need to re-run
//! - [`state`] - Run records and the target index
//! - [`lock`] - Target layout and the duplication guard
//! - [`orchestrator`] - Incremental runs and target duplication
//! - [`settings`] - Project settings
//! - [`cli`] - Command-line interface and argument parsing
//! - [`ui`] - Prompts, spinners, and terminal output
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```
//! use pipewright::workflow::{order, WorkflowDefinition, WorkflowStep};
//!
//! let workflow = WorkflowDefinition::new("report", "1.0.0")
//!     .with_step(WorkflowStep::new("summarise", "acme.summarise").depends_on(["extract"]))
//!     .with_step(WorkflowStep::new("extract", "acme.extract"));
//!
//! assert_eq!(order(&workflow).unwrap(), vec!["extract", "summarise"]);
//! ```

pub mod cli;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod plugin;
pub mod settings;
pub mod staleness;
pub mod state;
pub mod ui;
pub mod workflow;

pub use error::{PipewrightError, Result};
