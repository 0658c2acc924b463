//! Internal error types for nexdesk-reqwest.

use nexdesk_identity::{AuthError, AuthErrorHint};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Result type alias for nexdesk-reqwest operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Internal error type for nexdesk-reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// URL could not be built.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    /// Session file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Api { status: StatusCode, reason: String },
}

impl From<Error> for AuthError {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    AuthError::timeout("Request timed out").with_source(e)
                } else if e.is_connect() {
                    AuthError::network_error("Connection failed").with_source(e)
                } else if e.is_decode() {
                    AuthError::serialization(e.to_string()).with_source(e)
                } else {
                    AuthError::network_error(e.to_string()).with_source(e)
                }
            }
            Error::Serde(e) => AuthError::serialization(e.to_string()).with_source(e),
            Error::Url(e) => AuthError::configuration(e.to_string()).with_source(e),
            Error::Io(e) => AuthError::external(e.to_string()).with_source(e),
            Error::Config(reason) => AuthError::configuration(reason),
            Error::Api { status, reason } => from_status(status, reason),
        }
    }
}

/// Maps a rejected request to an error kind.
fn from_status(status: StatusCode, reason: String) -> AuthError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AuthError::rate_limited(reason),
        StatusCode::CONFLICT => AuthError::conflict(reason),
        StatusCode::NOT_FOUND => AuthError::not_found(reason),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AuthError::timeout(reason),
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => match AuthErrorHint::classify(&reason) {
            Some(AuthErrorHint::InvalidCredentials | AuthErrorHint::EmailNotConfirmed) => {
                AuthError::invalid_credentials(reason)
            }
            Some(AuthErrorHint::AlreadyRegistered) => AuthError::conflict(reason),
            Some(AuthErrorHint::TooManyRequests) => AuthError::rate_limited(reason),
            _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                AuthError::invalid_credentials(reason)
            }
            _ => AuthError::invalid_input(reason),
        },
        _ => AuthError::external(reason),
    }
}

/// Error body returned by the auth and row APIs.
///
/// The auth API uses `error_description` or `msg`, the row API uses
/// `message`. `error` is a short code on both.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiErrorBody {
    /// Builds an error from a response body, falling back to the status text.
    pub(crate) fn into_error(body: &str, status: StatusCode) -> Error {
        let parsed: Self = serde_json::from_str(body).unwrap_or_default();
        let reason = parsed
            .error_description
            .or(parsed.msg)
            .or(parsed.message)
            .or(parsed.error)
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            });

        Error::Api { status, reason }
    }
}

#[cfg(test)]
mod tests {
    use nexdesk_identity::ErrorKind;

    use super::*;

    fn kind_of(body: &str, status: StatusCode) -> (ErrorKind, String) {
        let error = AuthError::from(ApiErrorBody::into_error(body, status));
        (error.kind, error.reason)
    }

    #[test]
    fn test_invalid_grant() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        let (kind, reason) = kind_of(body, StatusCode::BAD_REQUEST);
        assert_eq!(kind, ErrorKind::InvalidCredentials);
        assert_eq!(reason, "Invalid login credentials");
    }

    #[test]
    fn test_weak_password() {
        let body = r#"{"code":422,"msg":"Password should be at least 6 characters"}"#;
        let (kind, reason) = kind_of(body, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(kind, ErrorKind::InvalidInput);
        assert_eq!(reason, "Password should be at least 6 characters");
    }

    #[test]
    fn test_already_registered() {
        let body = r#"{"code":422,"msg":"User already registered"}"#;
        let (kind, _) = kind_of(body, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_row_api_conflict() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        let (kind, reason) = kind_of(body, StatusCode::CONFLICT);
        assert_eq!(kind, ErrorKind::Conflict);
        assert!(reason.starts_with("duplicate key"));
    }

    #[test]
    fn test_rate_limited() {
        let (kind, _) = kind_of("{}", StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(kind, ErrorKind::RateLimited);
    }

    #[test]
    fn test_unparseable_body_uses_status_text() {
        let (kind, reason) = kind_of("<html>", StatusCode::BAD_GATEWAY);
        assert_eq!(kind, ErrorKind::ExternalError);
        assert_eq!(reason, "Bad Gateway");
    }
}
