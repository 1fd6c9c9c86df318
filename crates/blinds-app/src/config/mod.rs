//! Configuration for Blinds Control
//!
//! Settings live in `config.toml` under the configuration directory
//! (`BLINDS_CONFIG_DIR`, or the platform config dir + `blinds-control`).

pub mod settings;
pub mod types;

pub use settings::{
    config_dir, load_settings, load_user_settings, save_settings, store_path, CONFIG_DIR_ENV_VAR,
};
pub use types::{ConnectionSettings, Settings, StorageSettings};
