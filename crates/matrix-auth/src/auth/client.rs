//! Entry point for user authentication against the MATRIX API.
//!
//! `AuthClient` holds the application's client credentials and performs the
//! unauthenticated calls: login, registration and password reset. A
//! successful login yields a [`Session`] that keeps itself fresh.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::api::response::required_str;
use crate::api::{map_response, Method, ReqwestTransport, ResponseError, Transport};
use crate::config::{AuthConfig, ConfigError};

use super::{decode_credentials, AuthError, Session};

// ============================================================================
// Endpoints
// ============================================================================

pub(crate) const TOKEN_PATH: &str = "/v1/oauth2/user/token";
pub(crate) const REFRESH_TOKEN_PATH: &str = "/v1/oauth2/user/refresh_token";
pub(crate) const REGISTER_PATH: &str = "/v1/oauth2/user/register";
pub(crate) const RESTORE_PASSWORD_PATH: &str = "/v1/user/request/restore_password";
pub(crate) const DEVICE_SECRET_PATH: &str = "/v2/device/secret";
pub(crate) const USER_DETAILS_PATH: &str = "/admin/user/details";

/// Shared state behind every clone of an `AuthClient`
struct ClientInner {
    config: AuthConfig,
    transport: Arc<dyn Transport>,
}

/// Handles MATRIX API user authorization.
/// Clone is cheap - all clones share one configuration and transport.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Create a client talking to `base_url` over the default HTTP transport.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = AuthConfig::new(base_url, client_id, client_secret)?;
        Self::with_config(config)
    }

    /// Create a client from a validated configuration.
    pub fn with_config(config: AuthConfig) -> Result<Self, ConfigError> {
        let transport =
            ReqwestTransport::new().map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client that sends requests through `transport`.
    pub fn with_transport(config: AuthConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner { config, transport }),
        }
    }

    /// Create a client from `MATRIX_AUTH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_config(AuthConfig::from_env()?)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Authenticate `username` with `password`, starting a session.
    ///
    /// The session's access token is refreshed automatically when it expires.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let config = &self.inner.config;
        let params = [
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret()),
            ("grant_type", "password"),
            ("jwt_token", "true"),
            ("refresh_token", "true"),
            ("username", username),
            ("password", password),
        ];

        let results = self.call(Method::Post, TOKEN_PATH, &params).await?;

        let (access_token, refresh_token) = match (
            required_str(&results, "access_token"),
            required_str(&results, "refresh_token"),
        ) {
            (Some(access), Some(refresh)) => (access.to_string(), refresh.to_string()),
            _ => return Err(ResponseError::Retrieval(Value::Object(results)).into()),
        };

        let credentials = decode_credentials(&access_token)?;
        info!(
            subject_id = %credentials.subject_id,
            expires_at = %credentials.expires_at,
            "User authenticated"
        );

        Ok(Session::start(
            self.clone(),
            credentials,
            access_token,
            refresh_token,
        ))
    }

    /// Register a new user with a `username`, `password`, and `role`.
    pub async fn register_new_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<Map<String, Value>, AuthError> {
        let params = [
            ("client_id", self.inner.config.client_id()),
            ("username", username),
            ("password", password),
            ("role", role),
            ("active", "true"),
        ];
        let results = self.call(Method::Post, REGISTER_PATH, &params).await?;
        info!(role = role, "User registered");
        Ok(results)
    }

    /// Request a password restore email for `username`.
    pub async fn forgot_password(&self, username: &str) -> Result<Map<String, Value>, AuthError> {
        let results = self
            .call(Method::Post, RESTORE_PASSWORD_PATH, &[("user_email", username)])
            .await?;
        Ok(results)
    }

    /// Send one request and classify its outcome.
    pub(crate) async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Map<String, Value>, ResponseError> {
        let url = self.inner.config.endpoint(path);
        debug!(%method, path = path, "Calling API");
        map_response(self.inner.transport.send(method, &url, params).await)
    }
}
