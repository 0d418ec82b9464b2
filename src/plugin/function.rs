//! Closure-backed plugins for compiled-in steps.

use serde_json::Value;

use super::contract::{Plugin, PluginMetadata, StepContext, StepInputs, StepOutputs};

type RunFn = dyn Fn(&StepContext, &StepInputs, &Value) -> anyhow::Result<StepOutputs> + Send + Sync;
type ValidateFn = dyn Fn(&Value) -> Vec<String> + Send + Sync;

/// A plugin built from a function and its metadata.
pub struct FnPlugin {
    metadata: PluginMetadata,
    run: Box<RunFn>,
    validate: Option<Box<ValidateFn>>,
}

impl FnPlugin {
    pub fn new<F>(metadata: PluginMetadata, run: F) -> Self
    where
        F: Fn(&StepContext, &StepInputs, &Value) -> anyhow::Result<StepOutputs>
            + Send
            + Sync
            + 'static,
    {
        Self {
            metadata,
            run: Box::new(run),
            validate: None,
        }
    }

    /// Attach a config validator.
    pub fn with_config_validator<V>(mut self, validate: V) -> Self
    where
        V: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        self.validate = Some(Box::new(validate));
        self
    }
}

impl Plugin for FnPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn run(
        &self,
        ctx: &StepContext,
        inputs: &StepInputs,
        config: &Value,
    ) -> anyhow::Result<StepOutputs> {
        (self.run)(ctx, inputs, config)
    }

    fn validate_config(&self, config: &Value) -> Vec<String> {
        self.validate
            .as_ref()
            .map(|validate| validate(config))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPlugin")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
