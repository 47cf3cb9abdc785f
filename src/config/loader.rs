//! Configuration loader with environment variable expansion

use super::{expand_env_vars, ConfigError, SyncConfig};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            let config = SyncConfig::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<SyncConfig, ConfigError> {
        let expanded = expand_env_vars(content);
        // An empty document deserializes to null, which means "all defaults"
        let config: SyncConfig = if expanded.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.validate()?;
        Ok(config)
    }
}
