//! Settings parser for config.toml

use std::path::{Path, PathBuf};

use super::types::Settings;
use blinds_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const STORE_FILENAME: &str = "store.toml";
const APP_DIR: &str = "blinds-control";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV_VAR: &str = "BLINDS_CONFIG_DIR";

/// Resolve the configuration directory.
///
/// `BLINDS_CONFIG_DIR` wins; otherwise `<config_dir>/blinds-control`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Load settings from `<config_dir>/config.toml`
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Load settings from the resolved configuration directory
pub fn load_user_settings() -> Settings {
    match config_dir() {
        Some(dir) => load_settings(&dir),
        None => {
            warn!("No configuration directory available, using defaults");
            Settings::default()
        }
    }
}

/// Save settings to `<config_dir>/config.toml`
///
/// Uses atomic write (temp file + rename).
pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir)
        .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;

    let config_path = config_dir.join(CONFIG_FILENAME);
    let temp_path = config_dir.join(".config.toml.tmp");

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("{}{}", generate_config_header(), content);

    std::fs::write(&temp_path, &full_content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, &config_path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    info!("Saved settings to {:?}", config_path);
    Ok(())
}

fn generate_config_header() -> String {
    r#"# Blinds Control Configuration
# Timeouts are in milliseconds.

"#
    .to_string()
}

/// Where the key-value store lives for these settings.
///
/// A relative `[storage] path` is taken relative to the config directory.
pub fn store_path(config_dir: &Path, settings: &Settings) -> PathBuf {
    match &settings.storage.path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => config_dir.join(path),
        None => config_dir.join(STORE_FILENAME),
    }
}
