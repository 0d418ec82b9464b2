//! Runs and duplications of targets.
//!
//! The [`Orchestrator`] ties the staleness plan, the engine and the run
//! record together for one target. The [`Duplicator`] copies a target under
//! the duplication lock.

pub mod duplicate;
pub mod incremental;

pub use duplicate::{set_dotted, DuplicateRequest, Duplicator};
pub use incremental::{load_run_config, Orchestrator, RunOutcome};
