//! Application context wiring configuration, preferences, and the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::config::preferences::{FilePreferences, PreferenceStore};
use crate::config::{ConfigStore, TetherConfig, preferences_file_path};
use crate::registry::ServerRegistry;
use crate::services::Services;
use crate::timing::NestedTimer;

/// Shared state for one frontend session.
///
/// Frontends create this once from the config directory and hand out the
/// registry. Preference writes stay in memory until [`AppContext::flush`].
#[derive(Debug)]
pub struct AppContext {
    config_dir: PathBuf,
    config: TetherConfig,
    prefs: Arc<FilePreferences>,
    registry: Arc<ServerRegistry>,
}

impl AppContext {
    /// Load `tether.toml` and `preferences.toml` from `config_dir` and build
    /// the registry on top of `services`.
    ///
    /// Setup settings and timing diagnostics from the config file replace
    /// whatever `services` carried.
    pub fn load(config_dir: impl Into<PathBuf>, services: Services) -> anyhow::Result<Self> {
        let config_dir = config_dir.into();
        let config = ConfigStore::from_dir(&config_dir).load()?;

        let prefs_path = preferences_file_path(&config_dir);
        let prefs = Arc::new(
            FilePreferences::open(&prefs_path)
                .with_context(|| format!("Failed to load preferences from {}", prefs_path.display()))?,
        );

        let services = services
            .with_settings(config.setup.settings())
            .with_timer(NestedTimer::new(config.diagnostics.timings));
        let registry = ServerRegistry::builder(services)
            .with_preferences(Arc::clone(&prefs) as Arc<dyn PreferenceStore>)
            .load();

        debug!(config_dir = %config_dir.display(), "application context loaded");
        Ok(Self {
            config_dir,
            config,
            prefs,
            registry,
        })
    }

    /// Load from the platform config directory.
    pub fn with_defaults(services: Services) -> anyhow::Result<Self> {
        Self::load(crate::config::default_config_dir()?, services)
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Write pending preference changes to disk.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.prefs.flush()
    }
}
