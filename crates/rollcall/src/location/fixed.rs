//! A location source that reports a configured position.
//!
//! Used on hosts without positioning hardware, where the operator supplies
//! the coordinates (config file or command line).

use crate::geo::Coordinates;

use super::{LocationConfig, LocationError, LocationSource, PermissionState, UserLocation};

/// Reports a fixed position, or "services disabled" when none is configured.
#[derive(Debug, Clone, Default)]
pub struct FixedLocationSource {
    position: Option<Coordinates>,
    accuracy: Option<f64>,
}

impl FixedLocationSource {
    /// A source that always reports `position`.
    #[must_use]
    pub fn new(position: Coordinates, accuracy: Option<f64>) -> Self {
        Self {
            position: Some(position),
            accuracy,
        }
    }

    /// A source with no position; every fix fails with services disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// The configured position, if any.
    #[must_use]
    pub fn position(&self) -> Option<Coordinates> {
        self.position
    }
}

#[async_trait::async_trait]
impl LocationSource for FixedLocationSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn permission_status(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn current_position(
        &self,
        _config: &LocationConfig,
    ) -> Result<UserLocation, LocationError> {
        self.position
            .map(|position| UserLocation::new(position, self.accuracy))
            .ok_or(LocationError::ServicesDisabled)
    }
}
