//! Plugin manifest definitions.
//!
//! Every external plugin directory carries a `manifest.yaml` describing the
//! plugin and pointing at its entry point.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::PluginMetadata;

/// File name the loader looks for in each plugin directory.
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Namespace reserved for plugins compiled into the binary.
pub const RESERVED_NAMESPACE: &str = "builtin";

/// Parsed `manifest.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub version: String,
    /// Entry reference in `file:symbol` form.
    pub entry: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, alias = "use_llm")]
    pub uses_external_service: bool,
    #[serde(default)]
    pub config_schema: Option<Value>,
}

/// An entry reference split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub file: PathBuf,
    pub symbol: String,
}

impl PluginManifest {
    /// Parse manifest YAML text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let manifest: Self = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        manifest.check()?;
        Ok(manifest)
    }

    fn check(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("'id' must not be empty".to_string());
        }
        if !is_semver(&self.version) {
            return Err(format!(
                "version '{}' is not of the form MAJOR.MINOR.PATCH",
                self.version
            ));
        }
        match self.id.split_once('.') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
                if ns == RESERVED_NAMESPACE {
                    return Err(format!(
                        "namespace '{}' is reserved for built-in plugins",
                        RESERVED_NAMESPACE
                    ));
                }
            }
            _ => {
                return Err(format!(
                    "id '{}' must be namespaced as '<namespace>.<name>'",
                    self.id
                ))
            }
        }
        Ok(())
    }

    /// Split `entry` into file and symbol.
    ///
    /// The file must stay inside the plugin directory: absolute paths and
    /// `..` components are rejected.
    pub fn entry_point(&self) -> Option<EntryPoint> {
        let (file, symbol) = self.entry.rsplit_once(':')?;
        let (file, symbol) = (Path::new(file.trim()), symbol.trim());
        if file.as_os_str().is_empty() || symbol.is_empty() {
            return None;
        }
        let contained = file
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return None;
        }
        Some(EntryPoint {
            file: file.to_path_buf(),
            symbol: symbol.to_string(),
        })
    }

    /// Metadata the loaded plugin reports.
    pub fn metadata(&self) -> PluginMetadata {
        let mut meta = PluginMetadata::new(&self.id, &self.version)
            .with_description(&self.description)
            .with_inputs(self.inputs.clone())
            .with_outputs(self.outputs.clone())
            .with_external_service(self.uses_external_service);
        if let Some(name) = &self.name {
            meta = meta.with_name(name);
        }
        if let Some(schema) = &self.config_schema {
            meta = meta.with_config_schema(schema.clone());
        }
        meta
    }
}

fn is_semver(version: &str) -> bool {
    Regex::new(r"^\d+\.\d+\.\d+([-+][0-9A-Za-z.\-+]*)?$")
        .map(|re| re.is_match(version))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let yaml = r#"
id: acme.sentiment
version: 1.2.0
entry: "run.sh:sentiment"
name: Sentiment scoring
description: Scores each comment
inputs: [comments]
outputs: [sentiment]
use_llm: true
"#;
        let manifest = PluginManifest::parse(yaml).unwrap();
        assert_eq!(manifest.id, "acme.sentiment");
        assert!(manifest.uses_external_service);

        let meta = manifest.metadata();
        assert_eq!(meta.name, "Sentiment scoring");
        assert_eq!(meta.inputs, vec!["comments"]);
        assert_eq!(meta.outputs, vec!["sentiment"]);
    }

    #[test]
    fn name_defaults_to_id() {
        let manifest =
            PluginManifest::parse("id: acme.x\nversion: 0.1.0\nentry: run:x\n").unwrap();
        assert_eq!(manifest.metadata().name, "acme.x");
    }

    #[test]
    fn missing_entry_is_rejected() {
        assert!(PluginManifest::parse("id: acme.x\nversion: 0.1.0\n").is_err());
    }

    #[test]
    fn non_semver_version_is_rejected() {
        let err = PluginManifest::parse("id: acme.x\nversion: one\nentry: run:x\n").unwrap_err();
        assert!(err.contains("MAJOR.MINOR.PATCH"));
    }

    #[test]
    fn unnamespaced_id_is_rejected() {
        let err = PluginManifest::parse("id: plain\nversion: 1.0.0\nentry: run:x\n").unwrap_err();
        assert!(err.contains("namespaced"));
    }

    #[test]
    fn builtin_namespace_is_reserved() {
        let err =
            PluginManifest::parse("id: builtin.x\nversion: 1.0.0\nentry: run:x\n").unwrap_err();
        assert!(err.contains("reserved"));
    }

    #[test]
    fn entry_point_splits_file_and_symbol() {
        let manifest =
            PluginManifest::parse("id: acme.x\nversion: 1.0.0\nentry: bin/run.sh:score\n")
                .unwrap();
        let entry = manifest.entry_point().unwrap();
        assert_eq!(entry.file, PathBuf::from("bin/run.sh"));
        assert_eq!(entry.symbol, "score");
    }

    #[test]
    fn entry_outside_plugin_dir_is_invalid() {
        for entry in ["/bin/sh:x", "../shared/run.sh:x", "bin/../../run.sh:x"] {
            let manifest = PluginManifest::parse(&format!(
                "id: acme.x\nversion: 1.0.0\nentry: {}\n",
                entry
            ))
            .unwrap();
            assert!(manifest.entry_point().is_none(), "accepted {}", entry);
        }
    }

    #[test]
    fn entry_without_symbol_is_invalid() {
        let manifest =
            PluginManifest::parse("id: acme.x\nversion: 1.0.0\nentry: run.sh\n").unwrap();
        assert!(manifest.entry_point().is_none());
    }
}
