//! Config path resolution helpers.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "tether";
const CONFIG_FILE: &str = "tether.toml";
const PREFERENCES_FILE: &str = "preferences.toml";

/// Platform config directory for tether, e.g. `~/.config/tether`.
pub fn default_config_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_DIR);
    Ok(dir)
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE)
}

pub fn preferences_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(PREFERENCES_FILE)
}
