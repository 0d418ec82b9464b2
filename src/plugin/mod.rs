//! Plugin contract, registry, and loading.
//!
//! Compiled-in steps are [`FnPlugin`]s (or any type implementing
//! [`Plugin`]) registered explicitly. External steps live in plugin
//! directories and are loaded by [`PluginLoader`] as [`CommandPlugin`]s.

pub mod builtin;
pub mod command;
pub mod contract;
pub mod function;
pub mod loader;
pub mod manifest;
pub mod registry;

pub use builtin::register_builtins;
pub use command::CommandPlugin;
pub use contract::{Plugin, PluginMetadata, StepContext, StepInputs, StepOutputs, Usage};
pub use function::FnPlugin;
pub use loader::{
    discover_plugin_directories, LoadFailure, LoadMode, LoadReport, PluginLoadError, PluginLoader,
};
pub use manifest::{PluginManifest, MANIFEST_FILE};
pub use registry::PluginRegistry;
