//! Subprocess plugins.
//!
//! An external plugin is an executable invoked as `<file> <symbol> <action>`.
//! Requests are written to stdin as JSON and replies read from stdout:
//!
//! - `describe` replies `{"protocol": 1, "symbols": [..]}`
//! - `validate-config` receives `{"config": ..}` and replies `{"errors": [..]}`
//! - `run` receives `{"context": .., "inputs": .., "config": ..}` and replies
//!   with step outputs (`artifacts`, `usage`, `metadata`)

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::contract::{Plugin, PluginMetadata, StepContext, StepInputs, StepOutputs};
use super::loader::LoadFailure;

/// Protocol revision this host speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Captured result of one plugin invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
struct DescribeReply {
    protocol: u32,
    #[serde(default)]
    symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateReply {
    #[serde(default)]
    errors: Vec<String>,
}

/// A plugin backed by an executable in its plugin directory.
#[derive(Debug)]
pub struct CommandPlugin {
    metadata: PluginMetadata,
    program: PathBuf,
    symbol: String,
    workdir: PathBuf,
}

impl CommandPlugin {
    /// Perform the `describe` handshake and build the plugin.
    pub fn load(
        metadata: PluginMetadata,
        program: PathBuf,
        symbol: String,
        workdir: &Path,
    ) -> Result<Self, LoadFailure> {
        let plugin = Self {
            metadata,
            program,
            symbol,
            workdir: workdir.to_path_buf(),
        };

        let reply = plugin
            .invoke("describe", &Value::Null)
            .map_err(|e| LoadFailure::NotAPlugin(format!("{:#}", e)))?;
        if !reply.success {
            return Err(LoadFailure::NotAPlugin(format!(
                "describe exited with {:?}: {}",
                reply.exit_code,
                reply.stderr.trim()
            )));
        }
        let described: DescribeReply = serde_json::from_str(reply.stdout.trim())
            .map_err(|e| LoadFailure::NotAPlugin(format!("unreadable describe reply: {}", e)))?;
        if described.protocol != PROTOCOL_VERSION {
            return Err(LoadFailure::NotAPlugin(format!(
                "protocol {} is not supported (expected {})",
                described.protocol, PROTOCOL_VERSION
            )));
        }
        if !described.symbols.iter().any(|s| s == &plugin.symbol) {
            return Err(LoadFailure::SymbolNotFound {
                symbol: plugin.symbol.clone(),
            });
        }

        debug!(
            "Plugin {} answered describe in {:?}",
            plugin.metadata.id, reply.duration
        );
        Ok(plugin)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Run one protocol action, feeding `request` on stdin.
    pub fn invoke(&self, action: &str, request: &Value) -> anyhow::Result<Invocation> {
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .arg(&self.symbol)
            .arg(action)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("cannot execute {}", self.program.display()))?;

        let payload = serde_json::to_vec(request)?;
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                // The plugin may exit without reading its request.
                let _ = stdin.write_all(&payload);
            })
        });

        let output = child
            .wait_with_output()
            .with_context(|| format!("{} did not finish", self.program.display()))?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        Ok(Invocation {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
            success: output.status.success(),
        })
    }
}

impl Plugin for CommandPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn run(
        &self,
        ctx: &StepContext,
        inputs: &StepInputs,
        config: &Value,
    ) -> anyhow::Result<StepOutputs> {
        let request = json!({
            "context": ctx,
            "inputs": inputs,
            "config": config,
        });
        let reply = self.invoke("run", &request)?;
        if !reply.success {
            return Err(anyhow!(
                "{} exited with {:?}: {}",
                self.metadata.id,
                reply.exit_code,
                reply.stderr.trim()
            ));
        }

        let mut outputs: StepOutputs = serde_json::from_str(reply.stdout.trim())
            .with_context(|| format!("{} returned malformed outputs", self.metadata.id))?;
        for path in outputs.artifacts.values_mut() {
            if path.is_relative() {
                *path = ctx.output_dir.join(&*path);
            }
        }
        Ok(outputs)
    }

    fn validate_config(&self, config: &Value) -> Vec<String> {
        let reply = match self.invoke("validate-config", &json!({ "config": config })) {
            Ok(reply) => reply,
            Err(e) => return vec![format!("{:#}", e)],
        };
        if !reply.success {
            return vec![format!(
                "validate-config exited with {:?}: {}",
                reply.exit_code,
                reply.stderr.trim()
            )];
        }
        match serde_json::from_str::<ValidateReply>(reply.stdout.trim()) {
            Ok(parsed) => parsed.errors,
            Err(e) => vec![format!("unreadable validate-config reply: {}", e)],
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const SCRIPT: &str = r#"#!/bin/sh
case "$2" in
  describe) echo '{"protocol": 1, "symbols": ["score"]}' ;;
  validate-config)
    input=$(cat)
    case "$input" in
      *threshold*) echo '{"errors": []}' ;;
      *) echo '{"errors": ["threshold is required"]}' ;;
    esac ;;
  run)
    cat > /dev/null
    echo '{"artifacts": {"scores": "scores.csv"}, "usage": {"total": 5, "input": 3, "output": 2}}' ;;
  *) echo "unknown action" >&2; exit 2 ;;
esac
"#;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("run.sh");
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn load(dir: &Path, body: &str, symbol: &str) -> Result<CommandPlugin, LoadFailure> {
        let program = write_script(dir, body);
        CommandPlugin::load(
            PluginMetadata::new("acme.score", "1.0.0"),
            program,
            symbol.to_string(),
            dir,
        )
    }

    #[test]
    fn handshake_accepts_listed_symbol() {
        let temp = TempDir::new().unwrap();
        let plugin = load(temp.path(), SCRIPT, "score").unwrap();
        assert_eq!(plugin.symbol(), "score");
    }

    #[test]
    fn handshake_rejects_unknown_symbol() {
        let temp = TempDir::new().unwrap();
        let err = load(temp.path(), SCRIPT, "other").unwrap_err();
        assert!(matches!(err, LoadFailure::SymbolNotFound { .. }));
    }

    #[test]
    fn handshake_rejects_garbage_reply() {
        let temp = TempDir::new().unwrap();
        let err = load(temp.path(), "#!/bin/sh\necho hello\n", "score").unwrap_err();
        assert!(matches!(err, LoadFailure::NotAPlugin(_)));
        assert!(err.to_string().contains("plugin contract"));
    }

    #[test]
    fn run_resolves_relative_artifacts() {
        let temp = TempDir::new().unwrap();
        let plugin = load(temp.path(), SCRIPT, "score").unwrap();
        let ctx = StepContext::new("/data/out", "/data/in", "ds");

        let outputs = plugin
            .run(&ctx, &StepInputs::default(), &json!({}))
            .unwrap();
        assert_eq!(
            outputs.artifacts.get("scores"),
            Some(&PathBuf::from("/data/out/scores.csv"))
        );
        assert_eq!(outputs.usage.total, 5);
    }

    #[test]
    fn validate_config_relays_errors() {
        let temp = TempDir::new().unwrap();
        let plugin = load(temp.path(), SCRIPT, "score").unwrap();

        assert_eq!(
            plugin.validate_config(&json!({})),
            vec!["threshold is required"]
        );
        assert!(plugin.validate_config(&json!({"threshold": 1})).is_empty());
    }

    #[test]
    fn failing_run_carries_stderr() {
        let temp = TempDir::new().unwrap();
        let body = r#"#!/bin/sh
case "$2" in
  describe) echo '{"protocol": 1, "symbols": ["score"]}' ;;
  *) echo "model unavailable" >&2; exit 1 ;;
esac
"#;
        let plugin = load(temp.path(), body, "score").unwrap();
        let ctx = StepContext::new("/out", "/in", "ds");

        let err = plugin
            .run(&ctx, &StepInputs::default(), &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
    }
}
