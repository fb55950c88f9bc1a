//! Settings file loading.
//!
//! Lookup order: `$SCRIPT_JAIL_CONFIG` (must exist), then
//! `<config dir>/script-jail/<launcher>.json` if present, then built-in defaults.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::schema::LauncherConfig;
use crate::error::ConfigError;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "SCRIPT_JAIL_CONFIG";

const CONFIG_SUBDIR: &str = "script-jail";

/// `<config dir>/script-jail/<launcher>.json`.
pub fn default_config_path(launcher: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_SUBDIR).join(format!("{launcher}.json")))
}

/// Load a settings file that must exist.
pub fn load_config(path: &Path) -> Result<LauncherConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    parse_config(&content).map_err(|reason| ConfigError::ConfigFile {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse and validate settings JSON.
pub fn parse_config(json: &str) -> Result<LauncherConfig, String> {
    let config: LauncherConfig =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
    config.validate()?;
    Ok(config)
}

/// Resolve and load the settings for `launcher`.
pub fn load_launcher_config(launcher: &str) -> Result<LauncherConfig, ConfigError> {
    let explicit = std::env::var_os(CONFIG_ENV);
    match resolve_config_path(explicit, default_config_path(launcher)) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading settings");
            load_config(&path)
        }
        None => Ok(LauncherConfig::default()),
    }
}

/// An explicit path always wins and is returned even if missing, so that
/// loading it reports the error. The default path is used only if present.
fn resolve_config_path(explicit: Option<OsString>, default: Option<PathBuf>) -> Option<PathBuf> {
    match explicit {
        Some(p) if !p.is_empty() => Some(PathBuf::from(p)),
        _ => default.filter(|p| p.exists()),
    }
}
