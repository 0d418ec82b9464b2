//! The contract every step implementation satisfies.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata describing a plugin.
///
/// Constructed once and never mutated; the registry indexes plugins by
/// [`PluginMetadata::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PluginMetadata {
    /// Globally unique identifier, e.g. `analysis.extraction`.
    pub id: String,
    /// Semantic version of the implementation.
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Artifact names this step requires.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Artifact names this step produces.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Whether the step calls a paid or rate-limited external service.
    #[serde(default, alias = "use_llm")]
    pub uses_external_service: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,
}

impl PluginMetadata {
    /// Create metadata with the required fields; `name` defaults to `id`.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: version.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            uses_external_service: false,
            config_schema: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_external_service(mut self, uses: bool) -> Self {
        self.uses_external_service = uses;
        self
    }

    pub fn with_config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }
}

/// Read-only execution context handed to every step of a run.
#[derive(Clone, Serialize, Deserialize)]
pub struct StepContext {
    /// Directory the step writes its artifacts into.
    pub output_dir: PathBuf,
    /// Directory holding the run's input files.
    pub input_dir: PathBuf,
    /// Dataset identifier, used for file naming.
    pub dataset: String,
    pub provider: String,
    pub model: String,
    /// Address of a self-hosted service, if the provider needs one.
    #[serde(default)]
    pub service_address: Option<String>,
    /// Credential reference for the external service.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl StepContext {
    /// Create a context with no provider selection.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        input_dir: impl Into<PathBuf>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            input_dir: input_dir.into(),
            dataset: dataset.into(),
            provider: String::new(),
            model: String::new(),
            service_address: None,
            api_key: None,
        }
    }

    /// Build a context from a run configuration.
    ///
    /// Reads `provider`, `model`, `local_llm_address` and `user_api_key`
    /// from the top level of the configuration when present.
    pub fn from_config(
        config: &Value,
        output_dir: &Path,
        input_dir: &Path,
        dataset: &str,
    ) -> Self {
        let text = |key: &str| config.get(key).and_then(Value::as_str).map(String::from);
        Self {
            output_dir: output_dir.to_path_buf(),
            input_dir: input_dir.to_path_buf(),
            dataset: dataset.to_string(),
            provider: text("provider").unwrap_or_default(),
            model: text("model").unwrap_or_default(),
            service_address: text("local_llm_address"),
            api_key: text("user_api_key"),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }
}

// Credentials never reach logs.
impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("output_dir", &self.output_dir)
            .field("input_dir", &self.input_dir)
            .field("dataset", &self.dataset)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("service_address", &self.service_address)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Resource usage reported by a step (e.g. model tokens).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Usage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}

impl Usage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            total: input + output,
            input,
            output,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.input == 0 && self.output == 0
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// Inputs handed to a step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInputs {
    /// Artifact name to path, for the artifacts this step declared.
    pub artifacts: BTreeMap<String, PathBuf>,
    /// The full run configuration.
    pub config: Value,
}

/// Outputs produced by a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutputs {
    #[serde(default)]
    pub artifacts: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.artifacts.insert(name.into(), path.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// A pipeline step implementation.
///
/// The engine calls [`Plugin::validate_inputs`] and
/// [`Plugin::validate_config`] before [`Plugin::run`]; any message returned
/// from either hook prevents the run.
pub trait Plugin: Send + Sync {
    /// Static description of the plugin.
    fn metadata(&self) -> &PluginMetadata;

    /// Execute the step.
    fn run(
        &self,
        ctx: &StepContext,
        inputs: &StepInputs,
        config: &Value,
    ) -> anyhow::Result<StepOutputs>;

    /// Validate the resolved step configuration.
    fn validate_config(&self, _config: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Validate assembled inputs. By default every declared input must be present.
    fn validate_inputs(&self, inputs: &StepInputs) -> Vec<String> {
        self.metadata()
            .inputs
            .iter()
            .filter(|name| !inputs.artifacts.contains_key(*name))
            .map(|name| format!("Missing required input: {}", name))
            .collect()
    }

    fn id(&self) -> &str {
        &self.metadata().id
    }

    fn version(&self) -> &str {
        &self.metadata().version
    }
}
