//! User configuration and persisted preferences.
//!
//! - `tether.toml`: hand-editable settings (setup job, diagnostics)
//! - `preferences.toml`: registry state written by the application

pub mod parser;
pub mod paths;
pub mod preferences;
pub mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::setup::{DEFAULT_SETUP_TIMEOUT, SetupSettings};

pub use parser::{parse_tether_toml, parse_tether_toml_str, to_toml};
pub use paths::{config_file_path, default_config_dir, preferences_file_path};
pub use store::ConfigStore;

/// Contents of `tether.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub setup: SetupConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl TetherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.setup.timeout_secs == 0 {
            anyhow::bail!("setup.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

/// `[setup]`: remote support-file installation after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Install or update remote support files after connecting
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds to wait for setup before treating the server as online anyway
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_SETUP_TIMEOUT.as_secs()
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SetupConfig {
    pub fn settings(&self) -> SetupSettings {
        SetupSettings::default()
            .with_install_support(self.enabled)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// `[diagnostics]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Log nested setup timings at debug level
    #[serde(default)]
    pub timings: bool,
}
