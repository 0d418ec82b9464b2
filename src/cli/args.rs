//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Pipewright - incremental pipeline orchestration.
#[derive(Debug, Parser)]
#[command(name = "pipewright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to settings file (overrides pipewright.yml in the project root)
    #[arg(short, long, global = true, env = "PIPEWRIGHT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the workflow for a target, skipping up-to-date steps
    Run(RunArgs),

    /// Check the workflow definition and plugin availability
    Validate(ValidateArgs),

    /// List registered plugins
    Plugins(PluginsArgs),

    /// Show the run record of a target
    Status(StatusArgs),

    /// Copy a target into a new one
    Duplicate(DuplicateArgs),

    /// Print a JSON schema
    Schema(SchemaArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Target to run
    pub target: String,

    /// Re-run every step
    #[arg(short, long, conflicts_with = "only")]
    pub force: bool,

    /// Run only this step
    #[arg(long, value_name = "STEP")]
    pub only: Option<String>,

    /// Skip the rendering step
    #[arg(long)]
    pub without_rendering: bool,

    /// Show the plan without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub skip_interaction: bool,

    /// Workflow file (overrides settings)
    #[arg(short, long)]
    pub workflow: Option<PathBuf>,
}

/// Arguments for the `validate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ValidateArgs {
    /// Workflow file (overrides settings)
    pub workflow: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `plugins` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PluginsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StatusArgs {
    /// Target to show. Lists all targets when omitted.
    pub target: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Include completions carried over from earlier runs
    #[arg(long)]
    pub history: bool,
}

/// Arguments for the `duplicate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct DuplicateArgs {
    /// Target to copy
    pub source: String,

    /// New target id (default: <source>-copy-<date>)
    #[arg(long = "as", value_name = "TARGET")]
    pub target: Option<String>,

    /// Override a config value, e.g. --set extraction.limit=50
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub overrides: Vec<String>,

    /// Do not copy the source's outputs and run record
    #[arg(long)]
    pub no_reuse: bool,

    /// Run the workflow for the new target afterwards
    #[arg(long)]
    pub run: bool,
}

/// Schemas the `schema` command can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    Workflow,
    Plugin,
    Settings,
}

/// Arguments for the `schema` command.
#[derive(Debug, Clone, clap::Args)]
pub struct SchemaArgs {
    #[arg(value_enum)]
    pub kind: SchemaKind,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::parse_from([
            "pipewright",
            "run",
            "r1",
            "--only",
            "embed",
            "--without-rendering",
            "--dry-run",
            "-y",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.target, "r1");
                assert_eq!(args.only.as_deref(), Some("embed"));
                assert!(args.without_rendering);
                assert!(args.dry_run);
                assert!(args.skip_interaction);
                assert!(!args.force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn force_conflicts_with_only() {
        let result = Cli::try_parse_from(["pipewright", "run", "r1", "--force", "--only", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_duplicate_overrides() {
        let cli = Cli::parse_from([
            "pipewright",
            "duplicate",
            "src",
            "--as",
            "dst",
            "--set",
            "a.b=1",
            "--set",
            "model=gpt",
            "--no-reuse",
        ]);
        match cli.command {
            Commands::Duplicate(args) => {
                assert_eq!(args.source, "src");
                assert_eq!(args.target.as_deref(), Some("dst"));
                assert_eq!(args.overrides, vec!["a.b=1", "model=gpt"]);
                assert!(args.no_reuse);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
