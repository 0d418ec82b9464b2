//! Plugins compiled into the binary.
//!
//! These live in the reserved `builtin` namespace, which loaded plugins
//! cannot claim.

use std::fs;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use super::contract::{PluginMetadata, StepOutputs};
use super::function::FnPlugin;
use super::registry::PluginRegistry;
use crate::error::Result;

/// Publishes the target's input file as the `input` artifact.
pub const INPUT: &str = "builtin.input";

/// Writes `content` to `filename` in the output directory.
pub const WRITE: &str = "builtin.write";

/// Register every builtin plugin.
pub fn register_builtins(registry: &PluginRegistry) -> Result<()> {
    registry.register(Arc::new(input_plugin()))?;
    registry.register(Arc::new(write_plugin()))?;
    Ok(())
}

fn input_plugin() -> FnPlugin {
    let metadata = PluginMetadata::new(INPUT, env!("CARGO_PKG_VERSION"))
        .with_name("Input")
        .with_description("Expose the target's input file to downstream steps")
        .with_outputs(["input"]);

    FnPlugin::new(metadata, |ctx, _, _| {
        let prefix = format!("{}.", ctx.dataset);
        let found = fs::read_dir(&ctx.input_dir)
            .with_context(|| format!("Cannot read {}", ctx.input_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix))
                    .unwrap_or(false)
            });
        match found {
            Some(path) => Ok(StepOutputs::new().with_artifact("input", path)),
            None => anyhow::bail!("No input file for '{}' in {}", ctx.dataset, ctx.input_dir.display()),
        }
    })
}

fn write_plugin() -> FnPlugin {
    let metadata = PluginMetadata::new(WRITE, env!("CARGO_PKG_VERSION"))
        .with_name("Write")
        .with_description("Write a configured text to a file in the output directory");

    FnPlugin::new(metadata, |ctx, _, config| {
        let filename = config
            .get("filename")
            .and_then(Value::as_str)
            .context("'filename' is required")?;
        let content = match config.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string_pretty(other)?,
            None => String::new(),
        };
        let artifact = config
            .get("artifact")
            .and_then(Value::as_str)
            .unwrap_or(filename)
            .to_string();

        fs::create_dir_all(&ctx.output_dir)?;
        let path = ctx.output_dir.join(filename);
        fs::write(&path, content)
            .with_context(|| format!("Cannot write {}", path.display()))?;
        Ok(StepOutputs::new().with_artifact(artifact, path))
    })
    .with_config_validator(|config| {
        match config.get("filename").and_then(Value::as_str) {
            Some(name) if !name.is_empty() && !name.contains("..") => Vec::new(),
            Some(_) => vec!["'filename' must be a plain relative file name".to_string()],
            None => vec!["'filename' is required".to_string()],
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Plugin, StepContext, StepInputs};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn registers_in_reserved_namespace() {
        let registry = PluginRegistry::new();
        register_builtins(&registry).unwrap();
        assert_eq!(registry.ids(), vec![INPUT.to_string(), WRITE.to_string()]);
    }

    #[test]
    fn input_finds_dataset_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("r1.csv"), "a").unwrap();
        fs::write(temp.path().join("r10.csv"), "b").unwrap();
        let ctx = StepContext::new(temp.path().join("out"), temp.path(), "r1");

        let outputs = input_plugin()
            .run(&ctx, &StepInputs::default(), &json!({}))
            .unwrap();
        assert_eq!(outputs.artifacts["input"], temp.path().join("r1.csv"));
    }

    #[test]
    fn input_fails_without_file() {
        let temp = TempDir::new().unwrap();
        let ctx = StepContext::new(temp.path().join("out"), temp.path(), "r1");
        let err = input_plugin()
            .run(&ctx, &StepInputs::default(), &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("No input file"));
    }

    #[test]
    fn write_creates_artifact() {
        let temp = TempDir::new().unwrap();
        let ctx = StepContext::new(temp.path().join("out"), temp.path(), "r1");
        let plugin = write_plugin();

        let config = json!({"filename": "summary.json", "content": {"n": 3}, "artifact": "summary"});
        assert!(plugin.validate_config(&config).is_empty());
        let outputs = plugin.run(&ctx, &StepInputs::default(), &config).unwrap();

        let path = &outputs.artifacts["summary"];
        let written: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, json!({"n": 3}));
    }

    #[test]
    fn write_validates_filename() {
        let plugin = write_plugin();
        assert_eq!(plugin.validate_config(&json!({})), vec!["'filename' is required"]);
        assert!(!plugin.validate_config(&json!({"filename": "../x"})).is_empty());
    }
}
