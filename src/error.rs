use std::fmt;

/// Why the server refused a sign-in or token refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// 404: no account for these credentials
    NotFound,
    /// 401: credentials or token rejected
    Unauthorized,
    /// 422: request could not be processed (usually a malformed email)
    Unprocessable,
    /// Any other non-success status
    Rejected(u16),
    /// Success status but the `data` envelope was missing or incomplete
    MalformedResponse,
}

impl AuthFailure {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => AuthFailure::NotFound,
            401 => AuthFailure::Unauthorized,
            422 => AuthFailure::Unprocessable,
            other => AuthFailure::Rejected(other),
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::NotFound => write!(f, "not found"),
            AuthFailure::Unauthorized => write!(f, "unauthorized"),
            AuthFailure::Unprocessable => write!(f, "unprocessable"),
            AuthFailure::Rejected(status) => write!(f, "rejected with HTTP {}", status),
            AuthFailure::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Auth { reason: AuthFailure, message: String },
    NotAuthed,
    AuthExpiring,
    /// Reserved for write-protected properties. Nothing raises it yet.
    ReadOnlyProperty(String),
    KeyNotFound(String),
    MalformedResponse(String),
    Api { status: u16, message: String },
    Http(reqwest::Error),
    Json(serde_json::Error),
}

impl Error {
    pub fn auth(reason: AuthFailure, message: impl Into<String>) -> Self {
        Error::Auth {
            reason,
            message: message.into(),
        }
    }

    /// The token still works but should be refreshed before the next call
    pub fn is_auth_expiring(&self) -> bool {
        matches!(self, Error::AuthExpiring)
    }

    /// The session is gone and the caller has to sign in again
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Error::NotAuthed | Error::Auth { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth { reason, message } => {
                write!(f, "Authentication error ({}): {}", reason, message)
            }
            Error::NotAuthed => write!(
                f,
                "Culligan API not authenticated. Sign in first and retry."
            ),
            Error::AuthExpiring => write!(
                f,
                "Culligan API authentication expiring. Refresh and retry."
            ),
            Error::ReadOnlyProperty(name) => write!(f, "Property is read-only: {}", name),
            Error::KeyNotFound(name) => write!(f, "Property not populated: {}", name),
            Error::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            Error::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
