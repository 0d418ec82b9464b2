//! Workflow definitions and their execution.
//!
//! A [`WorkflowDefinition`] is ordered by the [`resolver`], and executed by
//! the [`WorkflowEngine`] one step at a time.

pub mod condition;
pub mod definition;
pub mod engine;
pub mod resolver;
pub mod result;
pub mod template;

pub use condition::evaluate_condition;
pub use definition::{WorkflowDefinition, WorkflowStep};
pub use engine::{RunProgress, SkipCause, WorkflowEngine};
pub use resolver::{order, validate, DependencyGraph};
pub use result::{StepResult, WorkflowResult};
pub use template::resolve_template;
