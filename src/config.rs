use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{errors::AppError, logging::project_directory};

pub const CONFIG_FILE: &str = "config.json";

/// Knobs of the thread engine. Missing fields fall back to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSettings {
    pub max_nesting_full: u32,
    pub max_nesting_preview: u32,
    /// Top-level replies shown in preview mode.
    pub preview_limit: usize,
    /// Rows from the bottom at which the full view asks for the next page.
    pub scroll_threshold: usize,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            max_nesting_full: 4,
            max_nesting_preview: 2,
            preview_limit: 3,
            scroll_threshold: 3,
        }
    }
}

impl ThreadSettings {
    pub fn default_path() -> Option<PathBuf> {
        project_directory().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Reads `explicit` if given, else the project config file when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let raw = std::fs::read_to_string(&path)?;
        let settings = serde_json::from_str::<Self>(&raw).map_err(|err| AppError::Config {
            path: path.clone(),
            message: err.to_string(),
        })?;
        settings.validate(&path)?;
        info!(path = %path.display(), ?settings, "Loaded config");
        Ok(settings)
    }

    fn validate(&self, path: &Path) -> Result<(), AppError> {
        let invalid = |message: &str| AppError::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.max_nesting_full == 0 || self.max_nesting_preview == 0 {
            return Err(invalid("max nesting must be at least 1"));
        }
        if self.preview_limit == 0 {
            return Err(invalid("preview_limit must be at least 1"));
        }
        Ok(())
    }
}
