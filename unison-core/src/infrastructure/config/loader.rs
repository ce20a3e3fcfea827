//! Layered configuration via Figment.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. `[profiles.<name>]` overrides from the same file
//! 4. Environment variables (`UNISON_` prefix, `__` section separator)

use crate::foundation::UnisonError;
use crate::infrastructure::config::types::AppConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::Dict;
use figment::{Figment, Profile};
use log::{debug, info};
use std::path::Path;

/// `UNISON_STREAM__WINDOW_SEGMENTS=40` -> `stream.window_segments`
pub const ENV_PREFIX: &str = "UNISON_";

pub fn load_config_from_file(path: &Path, data_dir: &Path) -> Result<AppConfig, UnisonError> {
    info!("config: loading path={} data_dir={}", path.display(), data_dir.display());
    let config: AppConfig = figment_base(path)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|err| UnisonError::ConfigError(format!("config extraction failed: {err}")))?;
    Ok(postprocess(config, data_dir))
}

pub fn load_config_from_file_with_profile(path: &Path, data_dir: &Path, profile: &str) -> Result<AppConfig, UnisonError> {
    info!("config: loading path={} data_dir={} profile={}", path.display(), data_dir.display(), profile);
    let base: AppConfig =
        figment_base(path).extract().map_err(|err| UnisonError::ConfigError(format!("config extraction failed: {err}")))?;
    let overrides = profile_overrides(&base, profile)?;

    let config: AppConfig = figment_base(path)
        .merge(Serialized::from(overrides, Profile::Default))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|err| UnisonError::ConfigError(format!("config extraction failed for profile '{profile}': {err}")))?;
    Ok(postprocess(config, data_dir))
}

fn figment_base(path: &Path) -> Figment {
    let figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
    if path.exists() {
        figment.merge(Toml::file(path))
    } else {
        debug!("config: file missing, using defaults and env path={}", path.display());
        figment
    }
}

fn profile_overrides(config: &AppConfig, profile: &str) -> Result<Dict, UnisonError> {
    config
        .profiles
        .as_ref()
        .ok_or_else(|| UnisonError::ConfigError("no profiles section in config".to_string()))?
        .get(profile)
        .cloned()
        .ok_or_else(|| UnisonError::ConfigError(format!("profile '{profile}' not found in config")))
}

fn postprocess(mut config: AppConfig, data_dir: &Path) -> AppConfig {
    if config.service.data_dir.trim().is_empty() {
        config.service.data_dir = data_dir.to_string_lossy().to_string();
    }
    if config.service.node_label.trim().is_empty() {
        config.service.node_label = "unison-node".to_string();
    }
    config.profiles = None;
    config
}
