//! Response schema and failure mapping.
//!
//! Every response body is expected to be a JSON object with a boolean
//! `success`. Successful payloads are decoded into a typed struct in one
//! step; a response that does not fit is reported as
//! [`AttendanceError::Unknown`] and never as success.
//!
//! Failures are mapped in a fixed order, first match wins:
//!
//! 1. a `code` field naming a server-side kind (`already_registered`,
//!    `out_of_range`, ...);
//! 2. the HTTP status: 401 unauthorized, 403 event inactive, 404 QR not
//!    recognized, 409 already registered, 425 event not started,
//!    400/422 validation;
//! 3. `success: false` with field `errors` is a validation failure;
//! 4. anything else is unknown.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiResponse;
use crate::error::AttendanceError;
use crate::kind::ErrorKind;
use crate::model::numeric;

/// Per-field validation messages, keyed by request field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Messages for one field.
    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    /// True when no field has a message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Fields that have messages.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, messages)| !messages.is_empty())
            .map(|(field, _)| field.as_str())
    }

    /// Add a message for a field.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }
}

/// Fields common to every response body.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    errors: Option<FieldErrors>,
    #[serde(default, deserialize_with = "numeric::deserialize_option")]
    distance: Option<f64>,
}

/// Decode a successful payload of type `T`, or map the failure.
///
/// # Errors
///
/// Returns the mapped [`AttendanceError`] for failure responses and
/// [`AttendanceError::Unknown`] for anything that doesn't fit the schema.
pub fn decode<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, AttendanceError> {
    if !response.is_success() {
        return Err(classify_failure(response));
    }

    let envelope: Envelope = serde_json::from_str(&response.body).map_err(|e| {
        warn!(status = response.status, error = %e, "Response body is not a JSON object");
        AttendanceError::unknown(Some(response.status), "response body is not a JSON object")
    })?;

    match envelope.success {
        Some(true) => serde_json::from_str(&response.body).map_err(|e| {
            warn!(status = response.status, error = %e, "Success response has unexpected shape");
            AttendanceError::unknown(
                Some(response.status),
                format!("success response has unexpected shape: {e}"),
            )
        }),
        Some(false) => Err(classify_envelope(response.status, Some(envelope))),
        None => Err(AttendanceError::unknown(
            Some(response.status),
            "response has no success flag",
        )),
    }
}

/// Map a failure response onto the error taxonomy.
#[must_use]
pub fn classify_failure(response: &ApiResponse) -> AttendanceError {
    let envelope = serde_json::from_str::<Envelope>(&response.body).ok();
    classify_envelope(response.status, envelope)
}

fn classify_envelope(status: u16, envelope: Option<Envelope>) -> AttendanceError {
    let (message, code, fields, distance) = match envelope {
        Some(env) => (
            env.message,
            env.code,
            env.errors.unwrap_or_default(),
            env.distance,
        ),
        None => (None, None, FieldErrors::default(), None),
    };
    let message = message.unwrap_or_else(|| format!("HTTP {status}"));

    let by_code = code.as_deref().and_then(ErrorKind::from_code);
    let by_status = match status {
        401 => Some(ErrorKind::Unauthorized),
        403 => Some(ErrorKind::EventInactive),
        404 => Some(ErrorKind::InvalidQr),
        409 => Some(ErrorKind::AlreadyRegistered),
        425 => Some(ErrorKind::EventNotStarted),
        400 | 422 => Some(ErrorKind::Validation),
        _ => None,
    };
    let by_fields = (!fields.is_empty()).then_some(ErrorKind::Validation);

    let error = [by_code, by_status, by_fields]
        .into_iter()
        .flatten()
        .find_map(|kind| server_error(kind, &message, &fields, distance))
        .unwrap_or_else(|| AttendanceError::unknown(Some(status), message.clone()));

    debug!(status, kind = %error.kind(), "Classified failure response");
    error
}

/// The error for a kind the server can report; `None` for device-side kinds.
fn server_error(
    kind: ErrorKind,
    message: &str,
    fields: &FieldErrors,
    distance: Option<f64>,
) -> Option<AttendanceError> {
    let message = message.to_string();
    let error = match kind {
        ErrorKind::InvalidQr => AttendanceError::QrNotRecognized { message },
        ErrorKind::Validation | ErrorKind::CoordinateOutOfBounds => AttendanceError::Validation {
            message,
            fields: fields.clone(),
        },
        ErrorKind::AlreadyRegistered => AttendanceError::AlreadyRegistered { message },
        ErrorKind::EventInactive => AttendanceError::EventInactive { message },
        ErrorKind::EventNotStarted => AttendanceError::EventNotStarted { message },
        ErrorKind::OutOfRange => AttendanceError::OutOfRange { message, distance },
        ErrorKind::Unauthorized => AttendanceError::Unauthorized { message },
        ErrorKind::LocationPermission
        | ErrorKind::LocationTimeout
        | ErrorKind::LocationUnavailable
        | ErrorKind::Network
        | ErrorKind::Unknown => return None,
    };
    Some(error)
}
