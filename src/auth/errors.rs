//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::JwtError;

/// Boxed error returned by reissue callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Policy construction errors. These are programmer errors and should stop startup.
#[derive(Debug)]
pub enum ConfigError {
    /// Key material or algorithm rejected by the codec
    Key(JwtError),
    /// Header name is not a valid HTTP header name
    InvalidHeaderName(String),
    /// Cookie name contains characters outside the token set
    InvalidCookieName(String),
    /// Cookie path contains `;` or control characters
    InvalidCookiePath(String),
    /// SameSite value other than Strict, Lax or None
    InvalidSameSite(String),
    /// A cookie transport can only wrap a header-transport policy
    IncompatibleBase,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Key(e) => write!(f, "Invalid signing configuration: {}", e),
            ConfigError::InvalidHeaderName(name) => write!(f, "Invalid header name: {}", name),
            ConfigError::InvalidCookieName(name) => write!(f, "Invalid cookie name: {}", name),
            ConfigError::InvalidCookiePath(path) => write!(f, "Invalid cookie path: {}", path),
            ConfigError::InvalidSameSite(value) => write!(f, "Invalid SameSite value: {}", value),
            ConfigError::IncompatibleBase => {
                write!(f, "Cookie transport requires a header-transport base policy")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Key(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JwtError> for ConfigError {
    fn from(e: JwtError) -> Self {
        ConfigError::Key(e)
    }
}

/// Errors from a transport's remember/forget.
#[derive(Debug)]
pub enum TransportError {
    /// Header-transport tokens are handed to clients by the API, not by cookies
    Unsupported,
    /// Token cannot be carried in a `Set-Cookie` header
    InvalidCookieValue,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Unsupported => {
                write!(f, "remember/forget is not supported by the header transport")
            }
            TransportError::InvalidCookieValue => write!(f, "Token is not a valid cookie value"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors raised while deciding on or performing a cookie reissue.
///
/// These never fail the request; they are logged and the existing claims stand.
#[derive(Debug)]
pub enum ReissueError {
    /// Verified token lacks a claim needed for reissue
    MissingClaim(&'static str),
    /// Reissue callback failed
    Callback(BoxError),
    /// Replacement token could not be written as a cookie
    Cookie(TransportError),
    /// Clock unavailable
    Clock(JwtError),
}

impl std::fmt::Display for ReissueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReissueError::MissingClaim(claim) => write!(f, "Token claims are missing {}", claim),
            ReissueError::Callback(e) => write!(f, "Reissue callback failed: {}", e),
            ReissueError::Cookie(e) => write!(f, "Failed to build reissue cookie: {}", e),
            ReissueError::Clock(e) => write!(f, "Failed to read clock: {}", e),
        }
    }
}

impl std::error::Error for ReissueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReissueError::Callback(e) => {
                let source: &(dyn std::error::Error + 'static) = e.as_ref();
                Some(source)
            }
            ReissueError::Cookie(e) => Some(e),
            ReissueError::Clock(e) => Some(e),
            ReissueError::MissingClaim(_) => None,
        }
    }
}

/// Rejection for extractors that require an authenticated principal.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Not authenticated",
            }),
        )
            .into_response()
    }
}
