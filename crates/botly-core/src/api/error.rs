use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// FastAPI wraps `HTTPException` messages as `{"detail": "..."}`.
#[derive(Deserialize)]
struct ErrorDetail {
    detail: serde_json::Value,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull the human-readable message out of an error body.
    fn message_from_body(body: &str) -> String {
        let message = match serde_json::from_str::<ErrorDetail>(body) {
            Ok(ErrorDetail { detail: serde_json::Value::String(s) }) => s,
            // Validation errors come back as a list of objects
            Ok(ErrorDetail { detail }) => detail.to_string(),
            Err(_) => body.trim().to_string(),
        };
        Self::truncate_body(&message)
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::message_from_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            code @ 500..=599 => ApiError::ServerError { status: code, message },
            code => ApiError::Rejected { status: code, message },
        }
    }

    /// Classify a transport failure. Timeouts are reported separately from
    /// other network errors so callers can word their retry prompt.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err)
        }
    }

    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::Rejected { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
            ApiError::Timeout
            | ApiError::Network(_)
            | ApiError::InvalidResponse(_)
            | ApiError::InvalidRequest(_) => None,
        }
    }

    /// The server's message, or the transport error text.
    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::InvalidResponse(m)
            | ApiError::InvalidRequest(m) => m.clone(),
            ApiError::Rejected { message, .. } | ApiError::ServerError { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    /// 401/403: the authority says the credential is no good.
    pub fn is_definitive_rejection(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::Forbidden(_))
    }

    /// Failures that say nothing about the credential.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout
                | ApiError::Network(_)
                | ApiError::ServerError { .. }
                | ApiError::RateLimited
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, "nope"),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "{}"),
            ApiError::Rejected { status: 422, .. }
        ));
    }

    #[test]
    fn test_detail_is_unwrapped() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"detail": "Email already registered"}"#,
        );
        assert_eq!(err.message(), "Email already registered");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_plain_text_body_kept() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "  boom \n");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "é".repeat(400);
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, &body);
        let message = err.message();
        assert!(message.contains("truncated"));
        assert!(message.len() < body.len());
    }

    #[test]
    fn test_rejection_vs_ambiguous() {
        let unauthorized = ApiError::Unauthorized("expired".into());
        assert!(unauthorized.is_definitive_rejection());
        assert!(!unauthorized.is_ambiguous());

        let forbidden = ApiError::Forbidden("revoked".into());
        assert!(forbidden.is_definitive_rejection());

        assert!(ApiError::Timeout.is_ambiguous());
        assert!(!ApiError::Timeout.is_definitive_rejection());
        assert!(ApiError::ServerError { status: 503, message: String::new() }.is_ambiguous());
        assert!(!ApiError::NotFound("gone".into()).is_ambiguous());
        assert!(!ApiError::InvalidResponse("bad json".into()).is_definitive_rejection());
    }
}
