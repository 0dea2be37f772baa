use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::types::Config;
use super::validation::Validate;
use crate::error::ConfigError;

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file, or fall back to defaults when it does not exist.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            info!("No config at {:?}, using defaults", self.config_path);
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file {:?}", self.config_path))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to load config file {:?}", self.config_path))
    }

    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.validate();
        Ok(config)
    }
}
