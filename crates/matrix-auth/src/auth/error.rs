use thiserror::Error;

use crate::api::ResponseError;

use super::DecodeError;

/// Failure of a user authentication or session operation.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The session was logged out and can no longer be used.
    #[error("Session has been logged out")]
    LoggedOut,
}

impl AuthError {
    /// True if the failure happened before any response was received
    pub fn is_transport(&self) -> bool {
        matches!(self, AuthError::Response(ResponseError::Transport(_)))
    }
}
