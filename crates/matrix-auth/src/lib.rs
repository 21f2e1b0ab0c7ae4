//! Client-side user authentication for the MATRIX API.
//!
//! Log in with an [`AuthClient`] to get a [`Session`]. The session holds the
//! access/refresh token pair and renews the access token on its own when it
//! expires; register a [`SessionObserver`] to veto or watch those refreshes.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use matrix_auth::AuthClient;
//!
//! let client = AuthClient::new("https://api.example.com", "client-id", "client-secret")?;
//! let session = client.authenticate("user@example.com", "password").await?;
//! let secret = session.device_secret("device-id").await?;
//! session.logout();
//! # let _ = secret;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ResponseError, Transport, TransportError};
pub use auth::{
    AuthClient, AuthError, ClaimSet, Credentials, DecodeError, Session, SessionObserver,
    SessionStatus,
};
pub use config::{AuthConfig, ConfigError};
