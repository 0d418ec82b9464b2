//! Schema command implementation.
//!
//! The `pipewright schema <kind>` command prints the JSON Schema of a
//! workflow file, a plugin manifest's metadata, or the settings file, for
//! editor integration.

use schemars::{schema_for, Schema};

use crate::cli::args::{SchemaArgs, SchemaKind};
use crate::error::Result;
use crate::plugin::PluginMetadata;
use crate::settings::Settings;
use crate::ui::UserInterface;
use crate::workflow::WorkflowDefinition;

use super::dispatcher::{Command, CommandResult};

/// Schema for one of the file formats pipewright reads.
pub fn schema(kind: SchemaKind) -> Schema {
    match kind {
        SchemaKind::Workflow => schema_for!(WorkflowDefinition),
        SchemaKind::Plugin => schema_for!(PluginMetadata),
        SchemaKind::Settings => schema_for!(Settings),
    }
}

/// The schema command implementation.
pub struct SchemaCommand {
    args: SchemaArgs,
}

impl SchemaCommand {
    pub fn new(args: SchemaArgs) -> Self {
        Self { args }
    }
}

impl Command for SchemaCommand {
    fn execute(&self, _ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let json = serde_json::to_string_pretty(&schema(self.args.kind))
            .map_err(|e| anyhow::anyhow!("Failed to serialize schema: {}", e))?;
        println!("{}", json);
        Ok(CommandResult::success())
    }
}
