//! Transport failures and their mapping onto the messages a user sees.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid api base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid request path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("no response from {path}: {source}")]
    Unreachable {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned HTTP {status}")]
    Status {
        path: String,
        status: u16,
        detail: Option<String>,
    },
    #[error("unexpected response body from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided `detail` string, if the response carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// What the user was trying to do when a request failed. The same status
/// code means different things depending on the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestContext {
    Login,
    Register,
    Profile,
}

impl RequestContext {
    fn validation_message(self) -> &'static str {
        match self {
            Self::Login => "Please check your email format",
            Self::Register => "Please check your input (email format, password length)",
            Self::Profile => "Please check your profile details",
        }
    }

    pub(crate) fn fallback_message(self) -> &'static str {
        match self {
            Self::Login => "Login failed",
            Self::Register => "Registration failed",
            Self::Profile => "Profile update failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCredentials,
    ValidationError,
    DuplicateAccount,
    NetworkUnreachable,
    ServerMessage,
    Unclassified,
}

impl ErrorKind {
    /// Every classified failure can be retried by the user; this tells the
    /// screen whether the retry needs different input.
    pub fn needs_new_input(self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::ValidationError | Self::DuplicateAccount
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub const NETWORK_UNREACHABLE_MESSAGE: &str =
    "Cannot connect to server. Please check your connection.";

/// Closed mapping from a transport failure to the user-facing taxonomy.
///
/// Precedence: action-specific status, 422, server `detail`, missing
/// response, fallback.
pub fn classify(context: RequestContext, error: &TransportError) -> ClassifiedError {
    match (context, error.status()) {
        (RequestContext::Login, Some(401)) => {
            ClassifiedError::new(ErrorKind::InvalidCredentials, "Invalid email or password")
        }
        (RequestContext::Register, Some(400)) => {
            ClassifiedError::new(ErrorKind::DuplicateAccount, "Email already exists")
        }
        (_, Some(422)) => {
            ClassifiedError::new(ErrorKind::ValidationError, context.validation_message())
        }
        _ => {
            if let Some(detail) = error.detail() {
                ClassifiedError::new(ErrorKind::ServerMessage, detail)
            } else if error.is_unreachable() {
                ClassifiedError::new(ErrorKind::NetworkUnreachable, NETWORK_UNREACHABLE_MESSAGE)
            } else {
                ClassifiedError::new(ErrorKind::Unclassified, context.fallback_message())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
