mod loader;
mod types;
pub mod validation;

pub use loader::{load_config_from_file, load_config_from_file_with_profile, ENV_PREFIX};
pub use types::*;

use crate::foundation::UnisonError;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "UNISON_CONFIG_PATH";
pub const DATA_DIR_ENV: &str = "UNISON_DATA_DIR";
pub const CONFIG_FILE_NAME: &str = "unison.toml";

/// Loads and validates config from `path`, or from the resolved default location.
pub fn load_app_config(path: Option<&Path>, profile: Option<&str>) -> Result<AppConfig, UnisonError> {
    let data_dir = resolve_data_dir()?;
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => resolve_config_path(&data_dir),
    };
    let config = match profile.map(str::trim).filter(|p| !p.is_empty()) {
        Some(profile) => load_config_from_file_with_profile(&path, &data_dir, profile)?,
        None => load_config_from_file(&path, &data_dir)?,
    };
    config.validate().map_err(|errors| UnisonError::ConfigError(format!("validation failed: {}", errors.join("; "))))?;
    Ok(config)
}

pub fn resolve_config_path(data_dir: &Path) -> PathBuf {
    env_path(CONFIG_PATH_ENV).unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME))
}

pub fn resolve_data_dir() -> Result<PathBuf, UnisonError> {
    if let Some(dir) = env_path(DATA_DIR_ENV) {
        return Ok(dir);
    }
    let cwd = std::env::current_dir().map_err(|err| UnisonError::StorageError { operation: "env::current_dir".to_string(), details: err.to_string() })?;
    Ok(cwd.join(".unison"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).map(PathBuf::from)
}
