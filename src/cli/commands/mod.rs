//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. Commands that touch a project load
//! a [`context::ProjectContext`] first, so settings and path layout are
//! resolved the same way everywhere.

pub mod completions;
pub mod context;
pub mod dispatcher;
pub mod duplicate;
pub mod plugins;
pub mod run;
pub mod schema;
pub mod status;
pub mod validate;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
