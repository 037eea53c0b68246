//! The user-facing failure taxonomy.
//!
//! Every failure an attendance attempt can end in collapses to one
//! [`ErrorKind`]. Each kind has exactly one message and one suggested
//! [`Remediation`], which is what the presentation layer acts on.

use serde::{Deserialize, Serialize};

/// Category of a failed attendance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The scanned payload is not an event QR code, or the server does not know it.
    InvalidQr,
    /// Location permission was refused.
    LocationPermission,
    /// No location fix arrived within the tier timeout.
    LocationTimeout,
    /// Location services are off or no fix can be produced.
    LocationUnavailable,
    /// The location fix has impossible coordinates.
    CoordinateOutOfBounds,
    /// The server rejected request fields.
    Validation,
    /// Attendance for this user and event already exists.
    AlreadyRegistered,
    /// The event is disabled or has ended.
    EventInactive,
    /// The event has not started yet.
    EventNotStarted,
    /// The user is outside the event's allowed radius.
    OutOfRange,
    /// The credential is missing, invalid or expired.
    Unauthorized,
    /// The server could not be reached or did not answer in time.
    Network,
    /// The server answered with something that could not be interpreted.
    Unknown,
}

/// What the user can do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// Scan a different code.
    RescanCode,
    /// Change a system setting (permissions, location services).
    OpenSettings,
    /// Try the same action again.
    Retry,
    /// Wait and try later.
    Wait,
    /// Correct the submitted data.
    FixInput,
    /// Nothing to do; the outcome is already what the user wanted.
    NoAction,
    /// Get closer to the event location.
    MoveCloser,
    /// Sign in again.
    Reauthenticate,
    /// The problem is on the service side.
    ContactSupport,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 13] = [
        Self::InvalidQr,
        Self::LocationPermission,
        Self::LocationTimeout,
        Self::LocationUnavailable,
        Self::CoordinateOutOfBounds,
        Self::Validation,
        Self::AlreadyRegistered,
        Self::EventInactive,
        Self::EventNotStarted,
        Self::OutOfRange,
        Self::Unauthorized,
        Self::Network,
        Self::Unknown,
    ];

    /// Stable snake_case identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidQr => "invalid_qr",
            Self::LocationPermission => "location_permission",
            Self::LocationTimeout => "location_timeout",
            Self::LocationUnavailable => "location_unavailable",
            Self::CoordinateOutOfBounds => "coordinate_out_of_bounds",
            Self::Validation => "validation",
            Self::AlreadyRegistered => "already_registered",
            Self::EventInactive => "event_inactive",
            Self::EventNotStarted => "event_not_started",
            Self::OutOfRange => "out_of_range",
            Self::Unauthorized => "unauthorized",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a snake_case identifier as sent in a server `code` field.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(code.trim()))
    }

    /// Message shown to the user for this kind.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidQr => "This QR code does not belong to any event.",
            Self::LocationPermission => "Location permission is required to register attendance.",
            Self::LocationTimeout => "Getting your location took too long.",
            Self::LocationUnavailable => "Your location is not available right now.",
            Self::CoordinateOutOfBounds => "The location reported by the device is not valid.",
            Self::Validation => "The attendance data was rejected by the server.",
            Self::AlreadyRegistered => "Your attendance for this event is already registered.",
            Self::EventInactive => "This event is not accepting attendance.",
            Self::EventNotStarted => "This event has not started yet.",
            Self::OutOfRange => "You are too far from the event location.",
            Self::Unauthorized => "Your session has expired. Please sign in again.",
            Self::Network => "Could not reach the attendance server.",
            Self::Unknown => "The server returned an unexpected response.",
        }
    }

    /// Suggested user action for this kind.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::InvalidQr => Remediation::RescanCode,
            Self::LocationPermission => Remediation::OpenSettings,
            Self::LocationTimeout | Self::Network => Remediation::Retry,
            Self::LocationUnavailable | Self::EventNotStarted => Remediation::Wait,
            Self::CoordinateOutOfBounds | Self::Validation => Remediation::FixInput,
            Self::AlreadyRegistered => Remediation::NoAction,
            Self::OutOfRange => Remediation::MoveCloser,
            Self::Unauthorized => Remediation::Reauthenticate,
            Self::EventInactive | Self::Unknown => Remediation::ContactSupport,
        }
    }

    /// True only for [`ErrorKind::Unauthorized`]; callers route back to sign-in.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// True for failures detected on the device without contacting the server.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidQr
                | Self::CoordinateOutOfBounds
                | Self::LocationPermission
                | Self::LocationTimeout
                | Self::LocationUnavailable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Remediation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::RescanCode => "scan the event QR code again",
            Self::OpenSettings => "open the system settings",
            Self::Retry => "try again",
            Self::Wait => "wait and try later",
            Self::FixInput => "check the submitted data",
            Self::NoAction => "no action needed",
            Self::MoveCloser => "move closer to the event",
            Self::Reauthenticate => "sign in again",
            Self::ContactSupport => "contact the event organizer",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_kind_messages_are_distinct() {
        let messages: HashSet<_> = ErrorKind::ALL.iter().map(ErrorKind::user_message).collect();
        assert_eq!(messages.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn test_kind_identifiers_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(" OUT_OF_RANGE "), Some(ErrorKind::OutOfRange));
        assert_eq!(ErrorKind::from_code("teapot"), None);
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_remediation_examples() {
        assert_eq!(ErrorKind::OutOfRange.remediation(), Remediation::MoveCloser);
        assert_eq!(ErrorKind::AlreadyRegistered.remediation(), Remediation::NoAction);
        assert_eq!(ErrorKind::EventNotStarted.remediation(), Remediation::Wait);
        assert_eq!(ErrorKind::LocationPermission.remediation(), Remediation::OpenSettings);
        assert_eq!(ErrorKind::LocationTimeout.remediation(), Remediation::Retry);
    }

    #[test]
    fn test_only_unauthorized_requires_reauthentication() {
        for kind in ErrorKind::ALL {
            assert_eq!(
                kind.requires_reauthentication(),
                kind == ErrorKind::Unauthorized
            );
        }
    }

    #[test]
    fn test_local_kinds() {
        assert!(ErrorKind::InvalidQr.is_local());
        assert!(ErrorKind::CoordinateOutOfBounds.is_local());
        assert!(!ErrorKind::Network.is_local());
        assert!(!ErrorKind::AlreadyRegistered.is_local());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::EventInactive.to_string(), "event_inactive");
        assert_eq!(Remediation::MoveCloser.to_string(), "move closer to the event");
    }
}
