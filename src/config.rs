use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listener: ListenerConfig,
    pub scripts: ScriptsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            address: "127.0.0.1".to_string(),
            port: 80,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Directory scanned recursively for endpoint scripts.
    pub dir: PathBuf,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        ScriptsConfig {
            dir: PathBuf::from("endpoints"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load the config file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Config::default());
        }

        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }
}
