//! Error types for rollcall.
//!
//! [`Error`] covers the ambient failures of the client (configuration and
//! HTTP client setup). [`AttendanceError`] is what an attendance attempt or
//! an API query ends in; every variant maps to exactly one [`ErrorKind`].

use thiserror::Error;

use crate::api::{FieldErrors, TransportError};
use crate::geo::CoordinateError;
use crate::kind::{ErrorKind, Remediation};
use crate::location::LocationError;
use crate::qr::InvalidQrCode;

/// The main error type for rollcall operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === HTTP Errors ===
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The API base URL is not usable.
    #[error("invalid API base URL {url:?}: {message}")]
    BaseUrl {
        /// The URL as configured.
        url: String,
        /// Why it was rejected.
        message: String,
    },
}

/// A specialized Result type for rollcall operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Why an attendance submission or an API query failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttendanceError {
    // === Local Errors ===
    /// The scanned payload is not a version-4 UUID.
    #[error(transparent)]
    InvalidQr(#[from] InvalidQrCode),

    /// The location fix has impossible coordinates.
    #[error("invalid location: {0}")]
    CoordinateOutOfBounds(#[from] CoordinateError),

    /// No usable location.
    #[error("location error: {0}")]
    Location(#[from] LocationError),

    // === Server Errors ===
    /// The server does not know this QR code.
    #[error("QR code not recognized: {message}")]
    QrNotRecognized {
        /// Server message.
        message: String,
    },

    /// The server rejected request fields.
    #[error("validation failed: {message}")]
    Validation {
        /// Server message.
        message: String,
        /// Per-field messages, when provided.
        fields: FieldErrors,
    },

    /// Attendance already exists for this user and event.
    #[error("attendance already registered: {message}")]
    AlreadyRegistered {
        /// Server message.
        message: String,
    },

    /// The event is disabled or over.
    #[error("event is not active: {message}")]
    EventInactive {
        /// Server message.
        message: String,
    },

    /// The event hasn't started.
    #[error("event has not started: {message}")]
    EventNotStarted {
        /// Server message.
        message: String,
    },

    /// The user is outside the allowed radius.
    #[error("out of range: {message}")]
    OutOfRange {
        /// Server message.
        message: String,
        /// Server-computed distance in meters, when reported.
        distance: Option<f64>,
    },

    /// The credential was rejected.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server message.
        message: String,
    },

    // === Transport / Protocol Errors ===
    /// The request never got an answer.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The server answered with something unrecognized.
    #[error("unexpected response{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Unknown {
        /// HTTP status, when a response arrived.
        status: Option<u16>,
        /// What was wrong with it.
        message: String,
    },
}

impl AttendanceError {
    /// Create an unknown-response error.
    #[must_use]
    pub fn unknown(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Unknown {
            status,
            message: message.into(),
        }
    }

    /// Taxonomy kind of this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQr(_) | Self::QrNotRecognized { .. } => ErrorKind::InvalidQr,
            Self::CoordinateOutOfBounds(_) => ErrorKind::CoordinateOutOfBounds,
            Self::Location(err) => err.kind(),
            Self::Validation { .. } => ErrorKind::Validation,
            Self::AlreadyRegistered { .. } => ErrorKind::AlreadyRegistered,
            Self::EventInactive { .. } => ErrorKind::EventInactive,
            Self::EventNotStarted { .. } => ErrorKind::EventNotStarted,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Network(_) => ErrorKind::Network,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Message for the user.
    ///
    /// Location failures keep their finer-grained message; everything else
    /// uses the kind's message.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Location(err) => err.user_message(),
            other => other.kind().user_message(),
        }
    }

    /// Suggested user action.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Location(err) => err.remediation(),
            other => other.kind().remediation(),
        }
    }

    /// The message the server sent, for server-reported failures.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::QrNotRecognized { message }
            | Self::Validation { message, .. }
            | Self::AlreadyRegistered { message }
            | Self::EventInactive { message }
            | Self::EventNotStarted { message }
            | Self::OutOfRange { message, .. }
            | Self::Unauthorized { message } => Some(message),
            _ => None,
        }
    }

    /// True when no request was sent.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.kind().is_local()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config_validation("bad timeout");
        assert_eq!(err.to_string(), "invalid configuration: bad timeout");

        let err = Error::HttpClient("no TLS backend".to_string());
        assert_eq!(err.to_string(), "failed to build HTTP client: no TLS backend");
    }

    #[test]
    fn test_base_url_error_display() {
        let err = Error::BaseUrl {
            url: "nope".to_string(),
            message: "relative URL without a base".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("relative URL"));
    }

    #[test]
    fn test_attendance_error_kinds() {
        let cases = [
            (
                AttendanceError::InvalidQr(InvalidQrCode { raw: "x".to_string() }),
                ErrorKind::InvalidQr,
            ),
            (
                AttendanceError::QrNotRecognized { message: String::new() },
                ErrorKind::InvalidQr,
            ),
            (
                AttendanceError::CoordinateOutOfBounds(CoordinateError::LatitudeOutOfBounds(91.0)),
                ErrorKind::CoordinateOutOfBounds,
            ),
            (
                AttendanceError::Location(LocationError::Timeout(Duration::from_secs(5))),
                ErrorKind::LocationTimeout,
            ),
            (
                AttendanceError::Network(TransportError::Connect("refused".to_string())),
                ErrorKind::Network,
            ),
            (AttendanceError::unknown(Some(500), "boom"), ErrorKind::Unknown),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_location_error_keeps_specific_message() {
        let err = AttendanceError::Location(LocationError::ServicesDisabled);
        assert_eq!(err.kind(), ErrorKind::LocationUnavailable);
        assert_eq!(err.user_message(), "Location services are turned off.");
        assert_eq!(err.remediation(), Remediation::OpenSettings);

        let err = AttendanceError::Location(LocationError::Unavailable);
        assert_eq!(err.remediation(), Remediation::Wait);
    }

    #[test]
    fn test_server_message() {
        let err = AttendanceError::AlreadyRegistered {
            message: "Ya registraste tu asistencia".to_string(),
        };
        assert_eq!(err.server_message(), Some("Ya registraste tu asistencia"));
        assert_eq!(AttendanceError::unknown(None, "x").server_message(), None);
    }

    #[test]
    fn test_unknown_display_includes_status() {
        let err = AttendanceError::unknown(Some(502), "bad gateway");
        assert_eq!(err.to_string(), "unexpected response (HTTP 502): bad gateway");

        let err = AttendanceError::unknown(None, "not JSON");
        assert_eq!(err.to_string(), "unexpected response: not JSON");
    }

    #[test]
    fn test_is_local() {
        assert!(AttendanceError::Location(LocationError::PermissionDenied).is_local());
        assert!(!AttendanceError::unknown(None, "x").is_local());
    }
}
