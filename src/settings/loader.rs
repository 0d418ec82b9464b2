//! Settings discovery and loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::Settings;
use crate::error::{PipewrightError, Result};

/// Settings file name in the project root.
pub const SETTINGS_FILE: &str = "pipewright.yml";

/// Load settings for a project.
///
/// An explicit path must exist. Without one, `pipewright.yml` in
/// `project_root` is used if present, else defaults. Environment overrides
/// are applied last.
pub fn load_settings(project_root: &Path, explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = match explicit {
        Some(path) => load_settings_file(path)?,
        None => {
            let path = project_root.join(SETTINGS_FILE);
            if path.exists() {
                load_settings_file(&path)?
            } else {
                debug!("No {} found, using defaults", SETTINGS_FILE);
                Settings::default()
            }
        }
    };
    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

/// Load one settings file.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the YAML is invalid.
pub fn load_settings_file(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipewrightError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            PipewrightError::Io(e)
        }
    })?;

    // An empty file is valid and means "all defaults".
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    serde_yaml::from_str(&content).map_err(|e| PipewrightError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = load_settings_file(&temp.path().join(SETTINGS_FILE));
        assert!(matches!(settings, Err(PipewrightError::ConfigNotFound { .. })));

        let settings = load_settings(temp.path(), None).unwrap();
        assert_eq!(settings.lock_ttl_secs, 600);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            "input_dir: data\nrendering_step: render\nalways_regenerate:\n  - report.html\n",
        )
        .unwrap();

        let settings = load_settings_file(&path).unwrap();
        assert_eq!(settings.input_dir, PathBuf::from("data"));
        assert_eq!(settings.rendering_step.as_deref(), Some("render"));
        assert_eq!(settings.always_regenerate, vec!["report.html"]);
        assert_eq!(settings.config_dir, PathBuf::from("configs"));
        assert_eq!(settings.heartbeat_secs, 300);
    }

    #[test]
    fn empty_file_is_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        fs::write(&path, "").unwrap();
        assert_eq!(load_settings_file(&path).unwrap(), Settings::default());
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        fs::write(&path, "lock_ttl_secs: [not a number\n").unwrap();
        assert!(matches!(
            load_settings_file(&path),
            Err(PipewrightError::ConfigParseError { .. })
        ));
    }

    #[test]
    fn explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("custom.yml");
        assert!(matches!(
            load_settings(temp.path(), Some(&missing)),
            Err(PipewrightError::ConfigNotFound { .. })
        ));
    }
}
