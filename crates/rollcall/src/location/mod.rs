//! Device geolocation behind a platform-agnostic seam.
//!
//! [`LocationSource`] is what a platform implements (OS permission prompt and
//! position fix). [`GeolocationProvider`] wraps a source with the behavior the
//! attendance flow relies on: a per-session permission cache, transparent
//! permission requests, and a hard timeout per accuracy tier.

pub mod fixed;

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::Coordinates;
use crate::kind::{ErrorKind, Remediation};

pub use fixed::FixedLocationSource;

/// Accuracy/latency trade-off for a location fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationTier {
    /// Best accuracy, slowest.
    #[default]
    High,
    /// Middle ground.
    Balanced,
    /// Coarse but fast.
    Low,
}

impl LocationTier {
    /// The timeout and staleness limits for this tier.
    #[must_use]
    pub fn config(self) -> LocationConfig {
        let (timeout_secs, maximum_age_secs) = match self {
            Self::High => (15, 10),
            Self::Balanced => (10, 30),
            Self::Low => (5, 60),
        };
        LocationConfig {
            tier: self,
            timeout: Duration::from_secs(timeout_secs),
            maximum_age: Duration::from_secs(maximum_age_secs),
        }
    }
}

impl std::fmt::Display for LocationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Balanced => write!(f, "balanced"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for LocationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "balanced" => Ok(Self::Balanced),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown location tier: {other}")),
        }
    }
}

/// Parameters for one location request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationConfig {
    /// Requested accuracy.
    pub tier: LocationTier,
    /// How long to wait for a fix before giving up.
    pub timeout: Duration,
    /// How old a previously captured fix may be and still be reused.
    pub maximum_age: Duration,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationTier::default().config()
    }
}

/// A captured device position. Held only for the duration of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    /// Where the device is.
    pub coordinates: Coordinates,
    /// Horizontal accuracy in meters, when reported.
    pub accuracy: Option<f64>,
    /// When the fix was taken.
    pub captured_at: DateTime<Utc>,
}

impl UserLocation {
    /// A fix taken now.
    #[must_use]
    pub fn new(coordinates: Coordinates, accuracy: Option<f64>) -> Self {
        Self {
            coordinates,
            accuracy,
            captured_at: Utc::now(),
        }
    }

    /// Age of the fix at `now`. Fixes from the future count as age zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// True while the fix is no older than the config's `maximum_age`.
    #[must_use]
    pub fn is_fresh(&self, config: &LocationConfig, now: DateTime<Utc>) -> bool {
        self.age_at(now) <= config.maximum_age
    }
}

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// The app may read the device location.
    Granted,
    /// The user refused, or the OS does not allow prompting.
    Denied,
}

/// Why a location could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Location permission refused.
    #[error("location permission denied")]
    PermissionDenied,

    /// No fix within the tier timeout.
    #[error("timed out after {0:?} waiting for a location fix")]
    Timeout(Duration),

    /// Location services are switched off.
    #[error("location services are disabled")]
    ServicesDisabled,

    /// The device could not produce a fix.
    #[error("location unavailable")]
    Unavailable,
}

impl LocationError {
    /// Taxonomy kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::LocationPermission,
            Self::Timeout(_) => ErrorKind::LocationTimeout,
            Self::ServicesDisabled | Self::Unavailable => ErrorKind::LocationUnavailable,
        }
    }

    /// Message for this exact failure; services-disabled and unavailable differ.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Location permission is required to register attendance.",
            Self::Timeout(_) => "Getting your location took too long.",
            Self::ServicesDisabled => "Location services are turned off.",
            Self::Unavailable => "Your location is not available right now.",
        }
    }

    /// What the user should do about it.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::PermissionDenied | Self::ServicesDisabled => Remediation::OpenSettings,
            Self::Timeout(_) => Remediation::Retry,
            Self::Unavailable => Remediation::Wait,
        }
    }
}

/// A platform's location services.
#[async_trait::async_trait]
pub trait LocationSource: Send + Sync {
    /// Name of this source (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Current permission without prompting.
    async fn permission_status(&self) -> PermissionState;

    /// Prompt the user for permission.
    async fn request_permission(&self) -> PermissionState;

    /// Produce a position fix.
    ///
    /// The provider applies the timeout; a source may take as long as the
    /// platform takes.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] when the platform cannot produce a fix.
    async fn current_position(
        &self,
        config: &LocationConfig,
    ) -> Result<UserLocation, LocationError>;
}

/// Location access with a session permission cache and bounded waits.
#[derive(Debug)]
pub struct GeolocationProvider<S> {
    source: S,
    permission: RwLock<Option<PermissionState>>,
}

impl<S: LocationSource> GeolocationProvider<S> {
    /// Wrap a source. The permission cache starts empty.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            permission: RwLock::new(None),
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Cached permission from an earlier prompt in this session.
    #[must_use]
    pub fn cached_permission(&self) -> Option<PermissionState> {
        self.permission.read().ok().and_then(|guard| *guard)
    }

    fn store_permission(&self, state: PermissionState) {
        if let Ok(mut guard) = self.permission.write() {
            *guard = Some(state);
        }
    }

    /// Prompt for permission and remember the answer for this session.
    pub async fn request_permission(&self) -> PermissionState {
        debug!(source = self.source.name(), "Requesting location permission");
        let state = self.source.request_permission().await;
        self.store_permission(state);
        match state {
            PermissionState::Granted => info!("Location permission granted"),
            PermissionState::Denied => warn!("Location permission denied"),
        }
        state
    }

    async fn ensure_permission(&self) -> Result<(), LocationError> {
        if self.cached_permission() == Some(PermissionState::Granted) {
            return Ok(());
        }
        if self.source.permission_status().await == PermissionState::Granted {
            self.store_permission(PermissionState::Granted);
            return Ok(());
        }
        match self.request_permission().await {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => Err(LocationError::PermissionDenied),
        }
    }

    /// Obtain the current location within the config's timeout.
    ///
    /// Asks for permission first when it hasn't been granted.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::PermissionDenied`] when permission is
    /// refused, [`LocationError::Timeout`] when no fix arrives in time, or
    /// whatever the source reports.
    pub async fn current_location(
        &self,
        config: &LocationConfig,
    ) -> Result<UserLocation, LocationError> {
        self.ensure_permission().await?;

        debug!(tier = %config.tier, timeout = ?config.timeout, "Waiting for location fix");
        let location = tokio::time::timeout(config.timeout, self.source.current_position(config))
            .await
            .map_err(|_| {
                warn!(tier = %config.tier, "Location fix timed out");
                LocationError::Timeout(config.timeout)
            })??;

        info!(
            coordinates = %location.coordinates,
            accuracy = ?location.accuracy,
            "Location acquired"
        );
        Ok(location)
    }
}
