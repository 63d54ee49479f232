//! Classified network errors surfaced by every component.

use thiserror::Error;

/// Classification of a failed request, loosely following the classes a
/// ground-station UI distinguishes when it renders a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    ConnectionRefused,
    HostNotFound,
    Timeout,
    /// Any other transport-level failure
    Transport,
    /// HTTP 401, or a login response without a token
    AuthenticationRequired,
    /// HTTP 403
    ContentAccessDenied,
    /// HTTP 404
    ContentNotFound,
    /// HTTP 405
    ContentOperationNotPermitted,
    /// HTTP 409
    ContentConflict,
    /// Other 4xx
    UnknownContent,
    /// HTTP 500
    InternalServerError,
    /// HTTP 503
    ServiceUnavailable,
    /// Other 5xx
    UnknownServer,
    /// Response body is not what the protocol requires
    MalformedResponse,
    Unknown,
}

impl NetworkErrorKind {
    /// Classify an HTTP status; `None` for non-error statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        let kind = match status {
            0..=399 => return None,
            401 => Self::AuthenticationRequired,
            403 => Self::ContentAccessDenied,
            404 => Self::ContentNotFound,
            405 => Self::ContentOperationNotPermitted,
            409 => Self::ContentConflict,
            400..=499 => Self::UnknownContent,
            500 => Self::InternalServerError,
            503 => Self::ServiceUnavailable,
            _ => Self::UnknownServer,
        };
        Some(kind)
    }

    /// Hint appended to user-facing messages.
    pub fn details(self) -> &'static str {
        match self {
            Self::ContentAccessDenied | Self::ContentOperationNotPermitted => " (invalid API key?)",
            Self::AuthenticationRequired => " (authentication failure)",
            _ => "",
        }
    }
}

/// A failed request: classification, transport message and the best-effort
/// message extracted from the server response (empty if none).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {error_string}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub error_string: String,
    pub server_message: String,
}

impl NetworkError {
    pub fn new(
        kind: NetworkErrorKind,
        error_string: impl Into<String>,
        server_message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            error_string: error_string.into(),
            server_message: server_message.into(),
        }
    }

    /// Render as the single message shown to the operator. The server text is
    /// preferred since the transport string is usually redundant with it.
    pub fn user_message(&self) -> String {
        let details = self.kind.details();
        if self.server_message.is_empty() {
            format!("AirMap error: {}{}", self.error_string, details)
        } else {
            format!(
                "AirMap error{}. Response from Server: {}",
                details, self.server_message
            )
        }
    }
}

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
}
