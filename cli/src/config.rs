// Configuration management for the mixnode CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/mixnode/config.json
// - Linux: ~/.config/mixnode/config.json
// - Windows: %APPDATA%\mixnode\config.json

use anyhow::{Context, Result};
use mixnode_core::{ChainConfig, DecoderConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remailer directory file (JSON list of records)
    pub directory_path: Option<String>,

    /// This node's secret key file
    pub key_path: Option<String>,

    /// Copies sent per message when `--copies` is not given
    pub default_copies: usize,

    /// Wildcard hop selection
    pub chain: ChainConfig,

    /// Relay-side packet acceptance
    pub decoder: DecoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory_path: None,
            key_path: None,
            default_copies: 1,
            chain: ChainConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("mixnode");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("mixnode");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, writing defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chain.validate()?;
        self.decoder.validate()?;
        if self.default_copies == 0 {
            anyhow::bail!("default_copies must be at least 1");
        }
        Ok(())
    }

    /// Directory file, defaulting to the data directory
    pub fn directory_file(&self) -> Result<PathBuf> {
        match &self.directory_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("directory.json")),
        }
    }

    /// Secret key file, defaulting to the data directory
    pub fn key_file(&self) -> Result<PathBuf> {
        match &self.key_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("node.key")),
        }
    }

    /// Set a config value; the result is validated before it is kept
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match key {
            "directory_path" => next.directory_path = optional_path(value),
            "key_path" => next.key_path = optional_path(value),
            "default_copies" => {
                next.default_copies = value.parse().context("Invalid number")?;
            }
            "distance" => {
                next.chain.distance = value.parse().context("Invalid number")?;
            }
            "min_latency" => {
                next.chain.min_latency = value.parse().context("Invalid number of minutes")?;
            }
            "max_latency" => {
                next.chain.max_latency = value.parse().context("Invalid number of minutes")?;
            }
            "min_reliability" => {
                next.chain.min_reliability = value.parse().context("Invalid percentage")?;
            }
            "min_exit_reliability" => {
                next.chain.min_exit_reliability = value.parse().context("Invalid percentage")?;
            }
            "max_packet_age_days" => {
                next.decoder.max_packet_age_days = value.parse().context("Invalid number of days")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "directory_path" => self.directory_path.clone(),
            "key_path" => self.key_path.clone(),
            "default_copies" => Some(self.default_copies.to_string()),
            "distance" => Some(self.chain.distance.to_string()),
            "min_latency" => Some(self.chain.min_latency.to_string()),
            "max_latency" => Some(self.chain.max_latency.to_string()),
            "min_reliability" => Some(self.chain.min_reliability.to_string()),
            "min_exit_reliability" => Some(self.chain.min_exit_reliability.to_string()),
            "max_packet_age_days" => Some(self.decoder.max_packet_age_days.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let auto = || "(auto)".to_string();
        vec![
            (
                "directory_path".to_string(),
                self.directory_path.clone().unwrap_or_else(auto),
            ),
            ("key_path".to_string(), self.key_path.clone().unwrap_or_else(auto)),
            ("default_copies".to_string(), self.default_copies.to_string()),
            ("distance".to_string(), self.chain.distance.to_string()),
            ("min_latency".to_string(), format!("{}m", self.chain.min_latency)),
            ("max_latency".to_string(), format!("{}m", self.chain.max_latency)),
            ("min_reliability".to_string(), format!("{}%", self.chain.min_reliability)),
            (
                "min_exit_reliability".to_string(),
                format!("{}%", self.chain.min_exit_reliability),
            ),
            (
                "max_packet_age_days".to_string(),
                format!("{}d", self.decoder.max_packet_age_days),
            ),
        ]
    }
}

fn optional_path(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_copies, 1);
        assert_eq!(config.chain.distance, 2);
        assert_eq!(config.decoder.max_packet_age_days, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.chain.max_latency, deserialized.chain.max_latency);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"default_copies": 3}"#).unwrap();
        assert_eq!(config.default_copies, 3);
        assert_eq!(config.chain.min_latency, 2);
    }

    #[test]
    fn test_set_get() {
        let mut config = Config::default();
        config.set("distance", "3").unwrap();
        config.set("max_packet_age_days", "7").unwrap();
        config.set("key_path", "/tmp/node.key").unwrap();

        assert_eq!(config.get("distance").as_deref(), Some("3"));
        assert_eq!(config.get("max_packet_age_days").as_deref(), Some("7"));
        assert_eq!(config.get("key_path").as_deref(), Some("/tmp/node.key"));
        assert!(config.get("nonsense").is_none());

        config.set("key_path", "").unwrap();
        assert!(config.key_path.is_none());
    }

    #[test]
    fn test_invalid_set_leaves_config_unchanged() {
        let mut config = Config::default();
        assert!(config.set("min_latency", "500").is_err());
        assert_eq!(config.chain.min_latency, 2);
        assert!(config.set("default_copies", "0").is_err());
        assert!(config.set("distance", "many").is_err());
        assert!(config.set("unknown", "1").is_err());
        assert!(config.set("max_packet_age_days", "2").is_err());
        assert_eq!(config.decoder.max_packet_age_days, 14);
    }

    #[test]
    fn test_load_creates_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::load_from(&path).unwrap();
        assert!(path.exists());

        config.set("min_reliability", "95.5").unwrap();
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert!((reloaded.chain.min_reliability - 95.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_list_covers_every_key() {
        let config = Config::default();
        for (key, _) in config.list() {
            assert!(config.get(&key).is_some() || key.ends_with("_path"));
        }
    }
}
