//! Client configuration.
//!
//! An `AuthConfig` carries the API base URL and the OAuth client credentials
//! issued for the application. It can be built from explicit values, from
//! `MATRIX_AUTH_*` environment variables (a `.env` file is honoured), or
//! from a JSON file:
//!
//! ```json
//! { "base_url": "https://api.example.com", "client_id": "...", "client_secret": "..." }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable holding the API base URL
pub const ENV_BASE_URL: &str = "MATRIX_AUTH_BASE_URL";

/// Environment variable holding the OAuth client ID
pub const ENV_CLIENT_ID: &str = "MATRIX_AUTH_CLIENT_ID";

/// Environment variable holding the OAuth client secret
pub const ENV_CLIENT_SECRET: &str = "MATRIX_AUTH_CLIENT_SECRET";

/// A configuration value was rejected at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid base URL: must not be empty")]
    InvalidBaseUrl,

    #[error("Invalid client ID: must not be empty")]
    InvalidClientId,

    #[error("Invalid client secret: must not be empty")]
    InvalidClientSecret,

    /// The default HTTP client could not be initialized.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug)]
pub struct AuthConfig {
    base_url: String,
    client_id: String,
    client_secret: SecretString,
}

/// On-disk shape of a config file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

impl AuthConfig {
    /// Validate and build a configuration.
    ///
    /// Checks run in a fixed order (base URL, client ID, client secret) and
    /// the first failing check is reported.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if base_url.trim().is_empty() {
            return Err(ConfigError::InvalidBaseUrl);
        }
        if client_id.trim().is_empty() {
            return Err(ConfigError::InvalidClientId);
        }
        if client_secret.trim().is_empty() {
            return Err(ConfigError::InvalidClientSecret);
        }

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client_id,
            client_secret: SecretString::new(client_secret.into()),
        })
    }

    /// Build from `MATRIX_AUTH_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Unset variables are treated as empty so the error names the field.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Silently ignore a missing .env file
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::new(
            lookup(ENV_BASE_URL).unwrap_or_default(),
            lookup(ENV_CLIENT_ID).unwrap_or_default(),
            lookup(ENV_CLIENT_SECRET).unwrap_or_default(),
        )
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: ConfigFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Self::new(file.base_url, file.client_id, file.client_secret)
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Join an absolute endpoint path onto the base URL
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_new_accepts_non_empty_values() {
        let config = AuthConfig::new("https://api.test", "id", "secret").unwrap();
        assert_eq!(config.base_url(), "https://api.test");
        assert_eq!(config.client_id(), "id");
        assert_eq!(config.client_secret(), "secret");
    }

    #[test]
    fn test_new_reports_first_invalid_field() {
        assert_eq!(
            AuthConfig::new("", "", "").unwrap_err(),
            ConfigError::InvalidBaseUrl
        );
        assert_eq!(
            AuthConfig::new("https://api.test", "", "").unwrap_err(),
            ConfigError::InvalidClientId
        );
        assert_eq!(
            AuthConfig::new("https://api.test", "id", "").unwrap_err(),
            ConfigError::InvalidClientSecret
        );
        assert_eq!(
            AuthConfig::new("https://api.test", "   ", "secret").unwrap_err(),
            ConfigError::InvalidClientId
        );
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let config = AuthConfig::new("https://api.test/", "id", "secret").unwrap();
        assert_eq!(
            config.endpoint("/v1/oauth2/user/token"),
            "https://api.test/v1/oauth2/user/token"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AuthConfig::new("https://api.test", "id", "hunter2").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_from_vars_missing_secret() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_URL, "https://api.test"),
            (ENV_CLIENT_ID, "id"),
        ]
        .into_iter()
        .collect();

        let err = AuthConfig::from_vars(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err, ConfigError::InvalidClientSecret);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"base_url": "https://api.test/", "client_id": "id", "client_secret": "secret"}}"#
        )
        .unwrap();

        let config = AuthConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_url(), "https://api.test");
    }

    #[test]
    fn test_from_file_invalid_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"base_url": "https://api.test", "client_id": "id"}}"#).unwrap();

        let err = AuthConfig::from_file(file.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidClientSecret)
        );
    }
}
