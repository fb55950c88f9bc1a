//! Settings file schema.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-launcher settings. Every field is optional; missing fields keep the
/// launcher's built-in profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LauncherConfig {
    /// Absolute path of the runtime binary.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,

    /// Arguments placed before the input path.
    #[serde(default)]
    pub interpreter_args: Option<Vec<String>>,

    /// Directory granted read+write by `-t`.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// File granted read by `-l`.
    #[serde(default)]
    pub timezone_file: Option<PathBuf>,

    /// Resource limit overrides, `NAME -> VALUE`, applied before `-r`/`-R`.
    #[serde(default)]
    pub rlimits: BTreeMap<String, u64>,
}

impl LauncherConfig {
    /// Check what can be checked without touching the filesystem.
    pub fn validate(&self) -> Result<(), String> {
        let paths = [
            ("interpreter", &self.interpreter),
            ("scratchDir", &self.scratch_dir),
            ("timezoneFile", &self.timezone_file),
        ];
        for (key, path) in paths {
            if let Some(p) = path {
                if !p.is_absolute() {
                    return Err(format!("{key} must be an absolute path: {}", p.display()));
                }
            }
        }
        if let Some(args) = &self.interpreter_args {
            if args.iter().any(|a| a.contains('\0')) {
                return Err("interpreterArgs must not contain NUL bytes".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_rejected() {
        let config = LauncherConfig {
            scratch_dir: Some(PathBuf::from("tmp")),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.starts_with("scratchDir must be an absolute path"));
    }

    #[test]
    fn test_default_is_valid() {
        assert!(LauncherConfig::default().validate().is_ok());
    }
}
