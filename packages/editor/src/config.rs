use crate::errors::EditorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "linkpage.config.json";

/// Session configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Backend state file used by the CLI
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Identity stamped on history entries
    #[serde(default = "default_author")]
    pub author: String,

    /// Id of the page's token-settings entity
    #[serde(default = "default_token_settings_id")]
    pub token_settings_id: String,

    /// How many history entries listings show
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_data_file() -> String {
    "linkpage.data.json".to_string()
}

fn default_author() -> String {
    "editor".to_string()
}

fn default_token_settings_id() -> String {
    "theme".to_string()
}

fn default_history_limit() -> usize {
    20
}

impl SessionConfig {
    /// Load config from a directory, falling back to defaults
    pub fn load(cwd: impl AsRef<Path>) -> Result<Self, EditorError> {
        let config_path = cwd.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: SessionConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(SessionConfig::default())
        }
    }

    /// Absolute path to the data file
    pub fn data_path(&self, cwd: impl AsRef<Path>) -> PathBuf {
        cwd.as_ref().join(&self.data_file)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            author: default_author(),
            token_settings_id: default_token_settings_id(),
            history_limit: default_history_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "dataFile": "page.json",
            "author": "sam",
            "historyLimit": 5
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_file, "page.json");
        assert_eq!(config.author, "sam");
        assert_eq!(config.token_settings_id, "theme");
        assert_eq!(config.history_limit, 5);
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.data_file, "linkpage.data.json");
        assert_eq!(config.history_limit, 20);
    }

    #[test]
    fn test_load_missing_falls_back() {
        let dir = std::env::temp_dir().join("linkpage_config_missing");
        std::fs::create_dir_all(&dir).unwrap();
        let _ = std::fs::remove_file(dir.join(DEFAULT_CONFIG_NAME));

        let config = SessionConfig::load(&dir).unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
