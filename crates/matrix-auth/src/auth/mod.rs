//! Authentication module for managing user sessions.
//!
//! This module provides:
//! - `AuthClient`: login, registration and password reset against the API
//! - `Session`: an authenticated user whose access token refreshes itself
//! - Token claim decoding and the one-shot refresh scheduler
//!
//! Access tokens are JWTs; their signature is never verified here.

pub mod claims;
pub mod client;
pub mod error;
pub mod scheduler;
pub mod session;

pub use claims::{decode_claims, decode_credentials, ClaimSet, Credentials, DecodeError};
pub use client::AuthClient;
pub use error::AuthError;
pub use scheduler::{schedule_once, CancelHandle};
pub use session::{Session, SessionObserver, SessionStatus};
