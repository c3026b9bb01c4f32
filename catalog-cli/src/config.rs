use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use channel_catalog::{CatalogConfig, InstanceConfig};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "channel-catalog";
const CONFIG_FILE: &str = "config.toml";

/// Settings read from `config.toml`. Missing sections fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite URL; defaults to a file in the user data directory.
    pub database_url: Option<String>,
    pub catalog: CatalogConfig,
    pub instance: InstanceConfig,
}

impl AppConfig {
    /// Load from `path`, or from the user config directory when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// `override_url` wins over the configured URL, which wins over the default file.
    pub fn database_url(&self, override_url: Option<&str>) -> Result<String> {
        if let Some(url) = override_url.or(self.database_url.as_deref()) {
            return Ok(url.to_owned());
        }
        let dir = dirs::data_dir()
            .context("No data directory available, pass --database")?
            .join(APP_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(format!("sqlite://{}", dir.join("catalog.db").display()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
