//! Error types for wafprobe.
//!
//! This module defines the error taxonomy for driving a remote web-chat
//! session: lifecycle misuse, transport-level failures surfaced as values,
//! server-reported errors, and protocol desynchronization.

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// The kind of a network-level failure.
///
/// These are expected conditions for a testing client and are carried as
/// values rather than raised; the orchestrator decides whether a failed turn
/// ends the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkFailureKind {
    /// The request exceeded its per-request timeout.
    Timeout,
    /// The connection could not be established or was dropped.
    Connection,
    /// TLS negotiation or certificate validation failed.
    Tls,
    /// Any other transport-level failure.
    Other,
}

impl fmt::Display for NetworkFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFailureKind::Timeout => write!(f, "timeout"),
            NetworkFailureKind::Connection => write!(f, "connection"),
            NetworkFailureKind::Tls => write!(f, "tls"),
            NetworkFailureKind::Other => write!(f, "other"),
        }
    }
}

/// The main error type for wafprobe.
#[derive(Clone, Debug)]
pub enum Error {
    /// An operation that requires an active chat session was invoked while
    /// no session is active.
    NotActive,

    /// `start` was invoked while a session is already active.
    AlreadyActive,

    /// A transport-level failure: timeout, refused connection, TLS failure.
    Network {
        /// The failure category.
        kind: NetworkFailureKind,
        /// Human-readable error message.
        message: String,
    },

    /// The server returned an error-bearing response.
    ServerError {
        /// HTTP status code or API-level error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// The server response was missing an expected field.
    MalformedResponse {
        /// The field that was absent or of the wrong shape.
        field: String,
    },

    /// Client and server state have desynchronized in a way that cannot be
    /// safely continued (e.g. a transcript cursor regression).
    ProtocolViolation {
        /// Human-readable description of the violation.
        message: String,
    },

    /// The external text-generation collaborator failed.
    Generation {
        /// Human-readable error message.
        message: String,
    },

    /// Invalid configuration supplied by the caller.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// Error during JSON serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// Creates a new network failure error.
    pub fn network(kind: NetworkFailureKind, message: impl Into<String>) -> Self {
        Error::Network {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new server error.
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Error::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Creates a new malformed-response error for a missing field.
    pub fn malformed(field: impl Into<String>) -> Self {
        Error::MalformedResponse {
            field: field.into(),
        }
    }

    /// Creates a new protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Creates a new generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this error ends the conversation: the client and
    /// server can no longer agree on shared state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotActive | Error::ProtocolViolation { .. })
    }

    /// Returns true if this is a transport-level failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    /// Returns true if this is a protocol violation.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotActive => {
                write!(f, "No active chat session")
            }
            Error::AlreadyActive => {
                write!(f, "A chat session is already active")
            }
            Error::Network { kind, message } => {
                write!(f, "Network failure ({kind}): {message}")
            }
            Error::ServerError { code, message } => {
                write!(f, "Server error {code}: {message}")
            }
            Error::MalformedResponse { field } => {
                write!(f, "Malformed response: missing field {field:?}")
            }
            Error::ProtocolViolation { message } => {
                write!(f, "Protocol violation: {message}")
            }
            Error::Generation { message } => {
                write!(f, "Generation error: {message}")
            }
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} (parameter: {param})")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

/// A specialized Result type for wafprobe operations.
pub type Result<T> = std::result::Result<T, Error>;
