//! Command-line interface for pipewright.
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{
    Cli, Commands, DuplicateArgs, PluginsArgs, RunArgs, SchemaArgs, StatusArgs, ValidateArgs,
};
pub use commands::{Command, CommandDispatcher, CommandResult};
