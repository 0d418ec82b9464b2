//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands};
use crate::error::Result;
use crate::ui::UserInterface;

use super::completions::CompletionsCommand;
use super::duplicate::DuplicateCommand;
use super::plugins::PluginsCommand;
use super::run::RunCommand;
use super::schema::SchemaCommand;
use super::status::StatusCommand;
use super::validate::ValidateCommand;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command.
    ///
    /// # Arguments
    ///
    /// * `ui` - User interface for displaying output and prompts
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    project_root: PathBuf,
    settings_path: Option<PathBuf>,
}

impl CommandDispatcher {
    /// Create a dispatcher for the given project root and optional settings
    /// file.
    pub fn new(project_root: PathBuf, settings_path: Option<PathBuf>) -> Self {
        Self {
            project_root,
            settings_path,
        }
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Dispatch and execute a command.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let root = self.project_root.as_path();
        let settings = self.settings_path.as_deref();
        match &cli.command {
            Commands::Run(args) => RunCommand::new(root, settings, args.clone()).execute(ui),
            Commands::Validate(args) => {
                ValidateCommand::new(root, settings, args.clone()).execute(ui)
            }
            Commands::Plugins(args) => PluginsCommand::new(root, settings, args.clone()).execute(ui),
            Commands::Status(args) => StatusCommand::new(root, settings, args.clone()).execute(ui),
            Commands::Duplicate(args) => {
                DuplicateCommand::new(root, settings, args.clone()).execute(ui)
            }
            Commands::Schema(args) => SchemaCommand::new(args.clone()).execute(ui),
            Commands::Completions(args) => CompletionsCommand::new(args.clone()).execute(ui),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_result_success() {
        let result = CommandResult::success();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn command_result_failure() {
        let result = CommandResult::failure(1);
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn dispatcher_creation() {
        let dispatcher = CommandDispatcher::new(PathBuf::from("/test"), None);
        assert_eq!(dispatcher.project_root(), Path::new("/test"));
    }

    #[test]
    fn dispatches_validate() {
        use clap::Parser;
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("workflow.yml"),
            "id: demo\nsteps:\n  - id: input\n    plugin: builtin.input\n",
        )
        .unwrap();

        let cli = Cli::parse_from(["pipewright", "validate"]);
        let mut ui = crate::ui::MockUI::new();
        let result = CommandDispatcher::new(temp.path().to_path_buf(), None)
            .dispatch(&cli, &mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.successes()[0].contains("demo"));
    }
}
