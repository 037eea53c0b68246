//! Attendance submission.
//!
//! [`AttendanceSubmitter::submit`] turns a raw scan plus an already captured
//! location into exactly one `POST /attendances`. Malformed QR payloads and
//! impossible coordinates are rejected before anything is sent. The request
//! is never retried: a second submission for the same user and event is a
//! conflict on the server, so retrying is left to the user.
//!
//! The server's `verified` flag and distance are authoritative. The distance
//! the client computes itself is advisory and only used for display.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::{response, ApiRequest, Transport};
use crate::error::AttendanceError;
use crate::location::UserLocation;
use crate::model::{numeric, AttendanceRecord};
use crate::qr::QrCode;

/// API path for registering attendance.
pub const ATTENDANCES_PATH: &str = "/attendances";

/// A registered attendance as confirmed by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceReceipt {
    /// The created record.
    pub record: AttendanceRecord,
    /// Server-computed distance from the event in meters.
    pub distance_meters: f64,
    /// Client-side Haversine distance to the embedded event, for display only.
    pub advisory_distance: Option<f64>,
    /// Server confirmation message.
    pub message: Option<String>,
}

impl AttendanceReceipt {
    /// The server's verification decision.
    #[must_use]
    pub fn verified(&self) -> bool {
        self.record.verified
    }

    /// Name of the event, when the server embedded it.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.record.event.as_ref().map(|e| e.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct SubmitPayload {
    attendance: AttendanceRecord,
    #[serde(deserialize_with = "numeric::deserialize")]
    distance: f64,
    #[serde(default)]
    message: Option<String>,
}

/// Registers attendance through a [`Transport`].
#[derive(Debug)]
pub struct AttendanceSubmitter<T> {
    transport: T,
}

impl<T: Transport> AttendanceSubmitter<T> {
    /// Create a submitter over `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Validate the scan and location, then submit once.
    ///
    /// # Errors
    ///
    /// Returns [`AttendanceError::InvalidQr`] or
    /// [`AttendanceError::CoordinateOutOfBounds`] without sending anything;
    /// otherwise the transport or server failure mapped onto the taxonomy.
    pub async fn submit(
        &self,
        raw_qr: &str,
        location: &UserLocation,
    ) -> Result<AttendanceReceipt, AttendanceError> {
        let code = QrCode::parse(raw_qr).map_err(|e| {
            warn!(raw = ?raw_qr, "Rejected malformed QR code");
            AttendanceError::from(e)
        })?;
        location.coordinates.validate().map_err(|e| {
            warn!(error = %e, "Rejected out-of-bounds location");
            AttendanceError::from(e)
        })?;

        info!(qr = %code, coordinates = %location.coordinates, "Submitting attendance");
        let body = json!({
            "qr_code": code.as_str(),
            "user_latitude": location.coordinates.latitude,
            "user_longitude": location.coordinates.longitude,
        });

        let response = self
            .transport
            .send(ApiRequest::post(ATTENDANCES_PATH, body))
            .await
            .map_err(|e| {
                warn!(error = %e, "Attendance request got no response");
                AttendanceError::Network(e)
            })?;

        let payload: SubmitPayload = response::decode(&response).map_err(|e| {
            warn!(status = response.status, kind = %e.kind(), error = %e, "Attendance rejected");
            e
        })?;

        let advisory_distance = payload.attendance.event.as_ref().map(|event| {
            let distance = event.distance_to(&location.coordinates);
            if event.is_within_radius(distance) != payload.attendance.verified {
                warn!(
                    server_distance = payload.distance,
                    client_distance = distance,
                    verified = payload.attendance.verified,
                    "Client distance disagrees with server verification; keeping server result"
                );
            }
            if !payload.attendance.is_consistent_with(event) {
                warn!(
                    record = payload.attendance.id,
                    "Server record verified flag does not match its own distance"
                );
            }
            distance
        });

        info!(
            attendance = payload.attendance.id,
            event = payload.attendance.event_id,
            distance = payload.distance,
            verified = payload.attendance.verified,
            "Attendance registered"
        );
        debug!(advisory_distance = ?advisory_distance, "Advisory distance");

        Ok(AttendanceReceipt {
            record: payload.attendance,
            distance_meters: payload.distance,
            advisory_distance,
            message: payload.message,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A valid event QR code.
    pub(crate) const QR: &str = "3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e34";

    /// Success body for a verified attendance 12.4 m from the event.
    pub(crate) fn success_body() -> String {
        format!(
            r#"{{
                "success": true,
                "message": "Asistencia registrada",
                "attendance": {{
                    "id": 11,
                    "event_id": 7,
                    "user_id": 1,
                    "user_latitude": "19.4327",
                    "user_longitude": "-99.1333",
                    "distance_meters": "12.4",
                    "verified": true,
                    "checked_in_at": "2025-08-03T14:30:21.000000Z",
                    "event": {{
                        "id": 7,
                        "name": "Quarterly all-hands",
                        "latitude": "19.4326",
                        "longitude": "-99.1332",
                        "allowed_radius": "100",
                        "start_time": "2025-08-03T14:00:00.000000Z",
                        "end_time": "2025-08-03T18:00:00.000000Z",
                        "qr_code": "{QR}",
                        "active": true
                    }}
                }},
                "distance": 12.4
            }}"#
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::fixtures::{success_body, QR};
    use super::*;
    use crate::api::testing::MockTransport;
    use crate::api::{Method, TransportError};
    use crate::geo::Coordinates;
    use crate::kind::ErrorKind;

    fn here() -> UserLocation {
        UserLocation::new(Coordinates::new(19.4327, -99.1333), Some(5.0))
    }

    #[tokio::test]
    async fn test_invalid_qr_makes_no_request() {
        let submitter = AttendanceSubmitter::new(MockTransport::new());
        for raw in ["", "hello", "3f2b8c1e-9d4a-1c6b-8e2f-1a7d5c9b0e34"] {
            let err = submitter.submit(raw, &here()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidQr);
        }
        assert_eq!(submitter.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_bounds_location_makes_no_request() {
        let submitter = AttendanceSubmitter::new(MockTransport::new());
        for (lat, lon) in [(91.0, 0.0), (0.0, -181.0), (f64::NAN, 0.0)] {
            let location = UserLocation::new(Coordinates::new(lat, lon), None);
            let err = submitter.submit(QR, &location).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CoordinateOutOfBounds);
        }
        assert_eq!(submitter.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let submitter =
            AttendanceSubmitter::new(MockTransport::new().respond(201, &success_body()));
        submitter
            .submit(&format!("  {QR}\n"), &here())
            .await
            .unwrap();

        let requests = submitter.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path, ATTENDANCES_PATH);
        assert_eq!(
            requests[0].body,
            Some(json!({
                "qr_code": QR,
                "user_latitude": 19.4327,
                "user_longitude": -99.1333,
            }))
        );
    }

    #[tokio::test]
    async fn test_success_uses_server_values() {
        let submitter =
            AttendanceSubmitter::new(MockTransport::new().respond(201, &success_body()));
        let receipt = submitter.submit(QR, &here()).await.unwrap();

        assert!(receipt.verified());
        assert_eq!(receipt.distance_meters, 12.4);
        assert_eq!(receipt.record.id, 11);
        assert_eq!(receipt.event_name(), Some("Quarterly all-hands"));
        assert_eq!(receipt.message.as_deref(), Some("Asistencia registrada"));
        let advisory = receipt.advisory_distance.unwrap();
        assert!(advisory > 0.0 && advisory < 100.0);
    }

    #[tokio::test]
    async fn test_client_distance_never_overrides_server() {
        // Server says unverified even though the client puts the user inside the radius.
        let body = success_body()
            .replace(r#""verified": true"#, r#""verified": false"#)
            .replace(r#""distance": 12.4"#, r#""distance": 150.0"#);
        let submitter = AttendanceSubmitter::new(MockTransport::new().respond(201, &body));
        let receipt = submitter.submit(QR, &here()).await.unwrap();

        assert!(!receipt.verified());
        assert_eq!(receipt.distance_meters, 150.0);
        assert!(receipt.advisory_distance.unwrap() < 100.0);
    }

    #[tokio::test]
    async fn test_already_registered_is_not_retried() {
        let submitter = AttendanceSubmitter::new(
            MockTransport::new()
                .respond(409, r#"{"success": false, "message": "Ya registrado"}"#)
                .respond(201, &success_body()),
        );
        let err = submitter.submit(QR, &here()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);
        assert_eq!(err.server_message(), Some("Ya registrado"));
        assert_eq!(submitter.transport().calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network() {
        let submitter = AttendanceSubmitter::new(
            MockTransport::new().fail(TransportError::Timeout(std::time::Duration::from_secs(10))),
        );
        let err = submitter.submit(QR, &here()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(submitter.transport().calls(), 1);
    }

    #[tokio::test]
    async fn test_success_without_attendance_is_unknown() {
        let submitter = AttendanceSubmitter::new(
            MockTransport::new().respond(200, r#"{"success": true, "message": "ok"}"#),
        );
        let err = submitter.submit(QR, &here()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_unauthorized_is_distinct() {
        let submitter = AttendanceSubmitter::new(
            MockTransport::new().respond(401, r#"{"message": "Unauthenticated."}"#),
        );
        let err = submitter.submit(QR, &here()).await.unwrap_err();
        assert!(err.kind().requires_reauthentication());
    }

    #[tokio::test]
    async fn test_out_of_range_by_code() {
        let submitter = AttendanceSubmitter::new(MockTransport::new().respond(
            422,
            r#"{"success": false, "message": "Fuera de rango", "code": "out_of_range", "distance": 321.0}"#,
        ));
        let err = submitter.submit(QR, &here()).await.unwrap_err();
        assert_eq!(
            err,
            AttendanceError::OutOfRange {
                message: "Fuera de rango".to_string(),
                distance: Some(321.0),
            }
        );
    }
}
