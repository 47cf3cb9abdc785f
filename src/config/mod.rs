//! Configuration module for personal-s3
//!
//! Handles loading and parsing of the optional YAML configuration file with
//! support for environment variable expansion and validation. Every section
//! is optional; a missing file yields [`SyncConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

use crate::upload::multipart::{MAX_PART_SIZE, MIN_PART_SIZE};

/// Directory name under `$HOME` holding one cache file per bucket
pub const DEFAULT_CACHE_DIR_NAME: &str = ".personal-s3";

/// Upper bound for `upload.concurrent_parts`
pub const MAX_CONCURRENT_PARTS: usize = 64;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("static regex is valid");
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Cannot determine cache directory: HOME is not set and cache.dir is not configured")]
    NoCacheDir,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SyncConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid S3 endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if let Some(ref region) = self.s3.region {
            if region.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "s3.region cannot be empty when set".into(),
                ));
            }
        }

        if self.s3.access_key.is_some() != self.s3.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "s3.access_key and s3.secret_key must be set together".into(),
            ));
        }

        if self.upload.part_size < MIN_PART_SIZE || self.upload.part_size > MAX_PART_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "Invalid upload.part_size {}: must be between {} and {} bytes",
                self.upload.part_size, MIN_PART_SIZE, MAX_PART_SIZE
            )));
        }

        if self.upload.concurrent_parts == 0 || self.upload.concurrent_parts > MAX_CONCURRENT_PARTS
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid upload.concurrent_parts {}: must be between 1 and {}",
                self.upload.concurrent_parts, MAX_CONCURRENT_PARTS
            )));
        }

        Ok(())
    }
}

/// S3 backend configuration
///
/// Unset fields fall back to the default AWS provider chain
/// (`AWS_REGION`, `AWS_ACCESS_KEY_ID`, profiles, instance metadata).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
    /// Files strictly smaller than this go through a single PutObject.
    /// Zero disables the single-shot path.
    #[serde(default)]
    pub multipart_threshold: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            concurrent_parts: default_concurrent_parts(),
            multipart_threshold: 0,
        }
    }
}

fn default_part_size() -> u64 {
    MIN_PART_SIZE // 5MB
}

fn default_concurrent_parts() -> usize {
    8
}

/// Completion cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    /// Resolve the cache directory, defaulting to `$HOME/.personal-s3`
    pub fn resolve_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.dir {
            return Ok(dir.clone());
        }
        std::env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(DEFAULT_CACHE_DIR_NAME))
            .ok_or(ConfigError::NoCacheDir)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Write Prometheus text exposition here at the end of a run
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.upload.part_size, 5 * 1024 * 1024);
        assert_eq!(config.upload.concurrent_parts, 8);
        assert_eq!(config.upload.multipart_threshold, 0);
    }

    #[test]
    fn test_part_size_below_minimum_rejected() {
        let mut config = SyncConfig::default();
        config.upload.part_size = 1024 * 1024;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = SyncConfig::default();
        config.upload.concurrent_parts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut config = SyncConfig::default();
        config.s3.access_key = Some("AKIA".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = SyncConfig::default();
        config.s3.endpoint = Some("localhost:9000".into());
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("PERSONAL_S3_MISSING");
        assert_eq!(
            expand_env_vars("region: ${PERSONAL_S3_MISSING:-eu-west-1}"),
            "region: eu-west-1"
        );
        assert_eq!(
            expand_env_vars("x: ${PERSONAL_S3_MISSING}"),
            "x: ${PERSONAL_S3_MISSING}"
        );
    }

    #[test]
    #[serial]
    fn test_cache_dir_defaults_to_home() {
        let original = std::env::var_os("HOME");
        std::env::set_var("HOME", "/tmp/personal-s3-home");

        let dir = CacheConfig::default().resolve_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/personal-s3-home/.personal-s3"));

        match original {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let config = CacheConfig {
            dir: Some(PathBuf::from("/var/cache/s3")),
        };
        assert_eq!(config.resolve_dir().unwrap(), PathBuf::from("/var/cache/s3"));
    }
}
