//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cloudbox_common::{Error, FolderId, Result};

use crate::workflow::WorkflowSettings;

/// Folder every upload lands in unless configured otherwise.
pub const DEFAULT_FOLDER_ID: &str = "1swELAYudL3yHLppgK2lu9BYwSn4HGRnv";

/// Directory name under the platform config directory.
const APP_DIR: &str = "cloudbox";
const CONFIG_FILE: &str = "config.json";
const TOKEN_FILE: &str = "token.json";
const CLIENT_SECRETS_FILE: &str = "credentials.json";

/// Platform configuration directory for CloudBox.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Location of the configuration file when none is given explicitly.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE)
}

/// Settings for one CloudBox session.
///
/// Every field has a default, so a configuration file only needs to list
/// what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Remote folder receiving uploads.
    pub folder_id: FolderId,
    /// Persisted credential bundle.
    pub token_file: PathBuf,
    /// OAuth client secrets downloaded from the Google Cloud console.
    pub client_secrets_file: PathBuf,
    /// Re-check that the selected file exists right before uploading.
    pub check_file_exists: bool,
    /// Loopback port for the consent redirect; `0` picks a free one.
    pub redirect_port: u16,
    /// Launch the system browser during login.
    pub open_browser: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            folder_id: FolderId::new(DEFAULT_FOLDER_ID).expect("default folder id is valid"),
            token_file: default_config_dir().join(TOKEN_FILE),
            client_secrets_file: PathBuf::from(CLIENT_SECRETS_FILE),
            check_file_exists: true,
            redirect_port: 0,
            open_browser: true,
        }
    }
}

impl AppConfig {
    /// Parse a configuration file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON, unknown keys, or an empty folder id
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&data).map_err(|e| {
            Error::Config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    /// Load the effective configuration.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = default_config_path();
                if path.is_file() {
                    tracing::debug!("Using config file {}", path.display());
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Settings the workflow controller needs.
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            folder_id: self.folder_id.clone(),
            check_file_exists: self.check_file_exists,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.folder_id.as_str(), DEFAULT_FOLDER_ID);
        assert!(config.check_file_exists);
        assert!(config.open_browser);
        assert_eq!(config.redirect_port, 0);
        assert!(config.token_file.ends_with("cloudbox/token.json"));
        assert_eq!(config.client_secrets_file, PathBuf::from("credentials.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"folder_id": "1B0fzHUfaGcbnqFjhqaNcKvz9WAcTJQvy", "check_file_exists": false}"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.folder_id.as_str(), "1B0fzHUfaGcbnqFjhqaNcKvz9WAcTJQvy");
        assert!(!config.check_file_exists);
        assert!(config.open_browser);
    }

    #[test]
    fn test_empty_folder_id_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"folder_id": ""}"#).unwrap();

        assert!(matches!(AppConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"folder": "x"}"#).unwrap();

        assert!(AppConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = AppConfig::load(Some(&temp.path().join("missing.json")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_workflow_settings() {
        let mut config = AppConfig::default();
        config.check_file_exists = false;
        let settings = config.workflow_settings();
        assert_eq!(settings.folder_id, config.folder_id);
        assert!(!settings.check_file_exists);
    }
}
