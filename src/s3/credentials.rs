//! S3 Credentials Module
//!
//! Resolves static credentials from configuration. When none are configured
//! the AWS default provider chain is used instead (environment variables,
//! shared profiles, instance metadata).
//!
//! # Example
//!
//! ```
//! use personal_s3::config::S3Config;
//! use personal_s3::s3::credentials::CredentialsProvider;
//!
//! let config = S3Config {
//!     access_key: Some("access-key".to_string()),
//!     secret_key: Some("secret-key".to_string()),
//!     ..Default::default()
//! };
//!
//! let creds = CredentialsProvider::from_config(&config).unwrap().unwrap();
//! assert_eq!(creds.access_key_id(), "access-key");
//! ```

use crate::config::S3Config;
use aws_credential_types::Credentials;
use thiserror::Error;

/// Name reported by credentials built from the config file
const PROVIDER_NAME: &str = "personal-s3-config";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Factory for credentials taken from configuration
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load static credentials from S3Config
    ///
    /// Returns `Ok(None)` when neither key is configured so the caller can
    /// fall back to the default chain. Supplying only one half is an error.
    pub fn from_config(config: &S3Config) -> Result<Option<Credentials>, CredentialsError> {
        match (&config.access_key, &config.secret_key) {
            (None, None) => Ok(None),
            (Some(access_key), Some(secret_key)) => {
                let access_key = access_key.trim();
                let secret_key = secret_key.trim();
                if access_key.is_empty() || secret_key.is_empty() {
                    return Err(CredentialsError::InvalidCredentials(
                        "access_key and secret_key cannot be empty".into(),
                    ));
                }
                Ok(Some(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    PROVIDER_NAME,
                )))
            }
            (Some(_), None) => Err(CredentialsError::MissingCredentials(
                "secret_key not set in config".into(),
            )),
            (None, Some(_)) => Err(CredentialsError::MissingCredentials(
                "access_key not set in config".into(),
            )),
        }
    }
}
