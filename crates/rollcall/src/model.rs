//! Domain types exchanged with the attendance service.
//!
//! The service is loose about numbers: coordinates, radii and distances may
//! arrive as JSON numbers or as numeric strings. Decoding accepts both and
//! rejects anything that is not a finite number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// Lifecycle position of an event at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Disabled by an administrator.
    Inactive,
    /// Before `start_time`.
    NotStarted,
    /// Within `[start_time, end_time]`.
    Open,
    /// After `end_time`.
    Ended,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::NotStarted => write!(f, "not_started"),
            Self::Open => write!(f, "open"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// An event attendance can be registered for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Server identifier.
    pub id: u64,

    /// Display name.
    pub name: String,

    /// Optional free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Event latitude in degrees.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub latitude: f64,

    /// Event longitude in degrees.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub longitude: f64,

    /// Radius around the event location, in meters, within which attendance is verified.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub allowed_radius: f64,

    /// When the event opens for attendance.
    pub start_time: DateTime<Utc>,

    /// When the event closes for attendance.
    pub end_time: DateTime<Utc>,

    /// The unique QR token for this event.
    pub qr_code: String,

    /// Administrative on/off switch.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Number of registered attendees, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees_count: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Event {
    /// The event's location.
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Where the event stands at `now`. Both window bounds are inclusive.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> EventStatus {
        if !self.active {
            EventStatus::Inactive
        } else if now < self.start_time {
            EventStatus::NotStarted
        } else if now > self.end_time {
            EventStatus::Ended
        } else {
            EventStatus::Open
        }
    }

    /// Great-circle distance from the event to `point`, in meters.
    #[must_use]
    pub fn distance_to(&self, point: &Coordinates) -> f64 {
        self.coordinates().distance_to(point)
    }

    /// True when `distance_meters` is inside the allowed radius.
    #[must_use]
    pub fn is_within_radius(&self, distance_meters: f64) -> bool {
        distance_meters <= self.allowed_radius
    }
}

/// A registered attendance, as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Server identifier.
    pub id: u64,

    /// The event attended.
    pub event_id: u64,

    /// The attendee.
    pub user_id: u64,

    /// Submitted latitude.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub user_latitude: f64,

    /// Submitted longitude.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub user_longitude: f64,

    /// Server-computed distance from the event location, in meters.
    #[serde(deserialize_with = "numeric::deserialize")]
    pub distance_meters: f64,

    /// Server decision: `distance_meters <= event.allowed_radius`.
    pub verified: bool,

    /// When the attendance was registered.
    pub checked_in_at: DateTime<Utc>,

    /// The event, when the server embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
}

impl AttendanceRecord {
    /// Where the attendee was when submitting.
    #[must_use]
    pub fn user_coordinates(&self) -> Coordinates {
        Coordinates::new(self.user_latitude, self.user_longitude)
    }

    /// Check the `verified` flag against the event's radius.
    #[must_use]
    pub fn is_consistent_with(&self, event: &Event) -> bool {
        self.verified == event.is_within_radius(self.distance_meters)
    }
}

/// Serde helpers for numbers that may arrive as strings.
pub(crate) mod numeric {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    fn finite<E: serde::de::Error>(value: NumberOrString) -> Result<f64, E> {
        let number = match value {
            NumberOrString::Number(n) => n,
            NumberOrString::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("expected a number, got {text:?}")))?,
        };
        if number.is_finite() {
            Ok(number)
        } else {
            Err(E::custom("expected a finite number"))
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        finite(NumberOrString::deserialize(deserializer)?)
    }

    pub(crate) fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<NumberOrString>::deserialize(deserializer)?
            .map(finite)
            .transpose()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};

    use super::*;

    pub(crate) fn event() -> Event {
        Event {
            id: 7,
            name: "Quarterly all-hands".to_string(),
            description: Some("Main auditorium".to_string()),
            address: None,
            latitude: 19.4326,
            longitude: -99.1332,
            allowed_radius: 100.0,
            start_time: Utc.with_ymd_and_hms(2025, 8, 3, 14, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 8, 3, 18, 0, 0).unwrap(),
            qr_code: "3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e34".to_string(),
            active: true,
            attendees_count: None,
        }
    }

    pub(crate) fn record(
        id: u64,
        event: &Event,
        distance: f64,
        verified: bool,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id,
            event_id: event.id,
            user_id: 1,
            user_latitude: 19.4327,
            user_longitude: -99.1333,
            distance_meters: distance,
            verified,
            checked_in_at: Utc.with_ymd_and_hms(2025, 8, 3, 14, 30, 21).unwrap(),
            event: Some(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::fixtures::{event, record};
    use super::*;

    #[test]
    fn test_event_status_window() {
        let event = event();
        let before = event.start_time - Duration::seconds(1);
        let after = event.end_time + Duration::seconds(1);

        assert_eq!(event.status_at(before), EventStatus::NotStarted);
        assert_eq!(event.status_at(event.start_time), EventStatus::Open);
        assert_eq!(event.status_at(event.end_time), EventStatus::Open);
        assert_eq!(event.status_at(after), EventStatus::Ended);
    }

    #[test]
    fn test_inactive_event_never_open() {
        let mut event = event();
        event.active = false;
        let midday = Utc.with_ymd_and_hms(2025, 8, 3, 15, 0, 0).unwrap();
        assert_eq!(event.status_at(midday), EventStatus::Inactive);
    }

    #[test]
    fn test_within_radius_is_inclusive() {
        let event = event();
        assert!(event.is_within_radius(100.0));
        assert!(event.is_within_radius(0.0));
        assert!(!event.is_within_radius(100.01));
    }

    #[test]
    fn test_record_consistency() {
        let event = event();
        assert!(record(1, &event, 12.4, true).is_consistent_with(&event));
        assert!(record(2, &event, 250.0, false).is_consistent_with(&event));
        assert!(!record(3, &event, 250.0, true).is_consistent_with(&event));
        assert!(!record(4, &event, 12.4, false).is_consistent_with(&event));
    }

    #[test]
    fn test_event_decodes_numeric_strings() {
        let json = r#"{
            "id": 7,
            "name": "Quarterly all-hands",
            "latitude": "19.43260000",
            "longitude": "-99.13320000",
            "allowed_radius": "100",
            "start_time": "2025-08-03T14:00:00.000000Z",
            "end_time": "2025-08-03T18:00:00.000000Z",
            "qr_code": "3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e34",
            "active": true,
            "attendees_count": 3
        }"#;
        let decoded: Event = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.latitude, 19.4326);
        assert_eq!(decoded.allowed_radius, 100.0);
        assert_eq!(decoded.attendees_count, Some(3));
    }

    #[test]
    fn test_event_rejects_non_numeric_strings() {
        let json = r#"{
            "id": 7, "name": "x", "latitude": "north", "longitude": 0,
            "allowed_radius": 1, "start_time": "2025-08-03T14:00:00Z",
            "end_time": "2025-08-03T18:00:00Z", "qr_code": "q"
        }"#;
        assert!(serde_json::from_str::<Event>(json).is_err());
    }

    #[test]
    fn test_event_rejects_nan_string() {
        let json = r#"{
            "id": 7, "name": "x", "latitude": "NaN", "longitude": 0,
            "allowed_radius": 1, "start_time": "2025-08-03T14:00:00Z",
            "end_time": "2025-08-03T18:00:00Z", "qr_code": "q"
        }"#;
        assert!(serde_json::from_str::<Event>(json).is_err());
    }

    #[test]
    fn test_event_active_defaults_true() {
        let json = r#"{
            "id": 7, "name": "x", "latitude": 1, "longitude": 2,
            "allowed_radius": 1, "start_time": "2025-08-03T14:00:00Z",
            "end_time": "2025-08-03T18:00:00Z", "qr_code": "q"
        }"#;
        let decoded: Event = serde_json::from_str(json).unwrap();
        assert!(decoded.active);
    }

    #[test]
    fn test_record_decodes_mixed_numbers() {
        let json = r#"{
            "id": 11, "event_id": 7, "user_id": 1,
            "user_latitude": "19.4327", "user_longitude": -99.1333,
            "distance_meters": "12.4", "verified": true,
            "checked_in_at": "2025-08-03T14:30:21.000000Z"
        }"#;
        let decoded: AttendanceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.distance_meters, 12.4);
        assert!(decoded.verified);
        assert!(decoded.event.is_none());
        assert_eq!(decoded.user_coordinates(), Coordinates::new(19.4327, -99.1333));
    }

    #[test]
    fn test_event_status_display() {
        assert_eq!(EventStatus::NotStarted.to_string(), "not_started");
        assert_eq!(EventStatus::Open.to_string(), "open");
    }
}
