//! Config store for loading and saving tether.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{TetherConfig, parser, paths::config_file_path};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn from_default_dir() -> anyhow::Result<Self> {
        Ok(Self::from_dir(&super::default_config_dir()?))
    }

    pub fn from_dir(config_dir: &Path) -> Self {
        Self {
            config_path: config_file_path(config_dir),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config; a missing file yields the defaults.
    pub fn load(&self) -> anyhow::Result<TetherConfig> {
        if !self.config_path.exists() {
            return Ok(TetherConfig::new());
        }
        parser::parse_tether_toml(&self.config_path)
    }

    pub fn save(&self, config: &TetherConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
