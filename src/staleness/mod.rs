//! Incremental re-run planning.
//!
//! Compares the current parameters of each step with what the previous run
//! recorded and decides which steps are stale.

pub mod evaluator;
pub mod spec;

pub use evaluator::{plan, Plan, PlanOptions, PlanReason, StepPlan};
pub use spec::{
    load_specs, params_from_config, params_from_workflow, specs_from_workflow, SpecDependencies,
    StepSpec,
};
