//! Errors surfaced by the REST transport.

use reqwest::StatusCode;
use thiserror::Error;

/// Fallback text when an error carries no usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("{0}")]
    Network(String),

    /// 401 from the backend. Credentials have already been cleared.
    #[error("Your session has expired. Please sign in again.")]
    Unauthorized,

    /// Any other non-2xx response. `message` is the server's own text when
    /// the payload carried one (business-rule rejections land here).
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Convert a `reqwest::Error` into a user-friendly message.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> ApiError {
    if err.is_connect() {
        return ApiError::Network(format!("Cannot reach the server at {url}"));
    }
    if err.is_timeout() {
        return ApiError::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return ApiError::InvalidRequest(format!("Invalid server URL: {url}"));
    }
    ApiError::Network(format!("Network error communicating with {url}: {err}"))
}

/// Message used when a non-2xx response has no JSON `message`.
pub(crate) fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        400 => "The request was rejected by the server".to_string(),
        403 => "You do not have permission to perform this action".to_string(),
        404 => "The requested resource was not found".to_string(),
        409 => "The request conflicts with the current state".to_string(),
        s if s >= 500 => format!("Server error (HTTP {s})"),
        s => format!("Unexpected response from server (HTTP {s})"),
    }
}

/// Render any displayable error for hook state, falling back to a generic
/// message when the rendered text is empty.
pub fn error_message<E: std::fmt::Display + ?Sized>(err: &E) -> String {
    let text = err.to_string();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        GENERIC_ERROR_MESSAGE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_falls_back_when_empty() {
        assert_eq!(error_message(&"  "), GENERIC_ERROR_MESSAGE);
        assert_eq!(
            error_message(&ApiError::Http {
                status: 404,
                message: "Employee not found".into()
            }),
            "Employee not found"
        );
    }

    #[test]
    fn status_is_exposed_for_http_errors() {
        assert_eq!(ApiError::Unauthorized.status(), Some(401));
        assert!(ApiError::Http {
            status: 404,
            message: String::new()
        }
        .is_not_found());
        assert_eq!(ApiError::Network("down".into()).status(), None);
    }
}
