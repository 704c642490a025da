use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced to whatever drives the session (CLI, UI).
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    ValidationFailed(String),

    #[error("Session expired or revoked - please log in again")]
    Unauthorized,

    #[error("Unable to reach the server: {0}")]
    NetworkUnavailable(String),

    #[error("The server took too long to respond")]
    Timeout,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Another sign-in is already in progress")]
    TransitionInProgress,

    #[error("Already signed in as {0}")]
    AlreadyAuthenticated(String),

    #[error("Not signed in")]
    NotAuthenticated,
}

/// What the failed call was doing, which decides how a status reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallContext {
    Login,
    Register,
    Authenticated,
}

impl SessionError {
    pub(crate) fn from_api(err: ApiError, context: CallContext) -> Self {
        match err {
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) if context == CallContext::Login => {
                SessionError::InvalidCredentials
            }
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) => SessionError::Unauthorized,
            ApiError::Rejected { message, .. } => SessionError::ValidationFailed(message),
            ApiError::NotFound(message) => SessionError::NotFound(message),
            ApiError::Timeout => SessionError::Timeout,
            ApiError::Network(e) => SessionError::NetworkUnavailable(e.to_string()),
            ApiError::RateLimited => SessionError::ServerError(ApiError::RateLimited.to_string()),
            ApiError::ServerError { message, .. } => SessionError::ServerError(message),
            ApiError::InvalidResponse(message) | ApiError::InvalidRequest(message) => {
                SessionError::UnexpectedResponse(message)
            }
        }
    }

    /// Ambiguous failures: offer a retry instead of a new login.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::NetworkUnavailable(_) | SessionError::Timeout | SessionError::ServerError(_)
        )
    }

    /// The credential is gone; send the user back to the login flow.
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionError::Unauthorized | SessionError::NotAuthenticated)
    }
}
