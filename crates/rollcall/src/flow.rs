//! The attendance flow state machine.
//!
//! ```text
//! idle -> scanning --scan--> invalid code           -> error
//!                            no fresh location      -> requesting-location -> submitting | error
//!                            fresh cached location  -> submitting
//! submitting -> success | error
//! success | error --reset()--> scanning
//! requesting-location | submitting --scan future dropped--> scanning
//! ```
//!
//! One attempt runs at a time: scans that arrive while a location fix or a
//! submission is in flight are ignored, and terminal states wait for an
//! explicit [`AttendanceFlow::reset`]. Presentation code observes the state
//! through [`AttendanceFlow::subscribe`]; after [`AttendanceFlow::close`]
//! in-flight work may still finish but no longer publishes anything.
//! Dropping a `scan` future mid-attempt returns the flow to scanning.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::Transport;
use crate::error::AttendanceError;
use crate::kind::{ErrorKind, Remediation};
use crate::location::{
    GeolocationProvider, LocationConfig, LocationSource, PermissionState, UserLocation,
};
use crate::qr::QrCode;
use crate::submit::{AttendanceReceipt, AttendanceSubmitter};

/// A failed attempt, as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowFailure {
    error: AttendanceError,
}

impl FlowFailure {
    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &AttendanceError {
        &self.error
    }

    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Message for the user.
    #[must_use]
    pub fn message(&self) -> &'static str {
        self.error.user_message()
    }

    /// Suggested action.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        self.error.remediation()
    }
}

impl From<AttendanceError> for FlowFailure {
    fn from(error: AttendanceError) -> Self {
        Self { error }
    }
}

/// Where the flow currently is.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FlowState {
    /// Nothing started.
    #[default]
    Idle,
    /// Camera ready, waiting for a code.
    Scanning,
    /// Waiting for a location fix.
    RequestingLocation,
    /// Waiting for the server.
    Submitting,
    /// Attendance registered.
    Success(AttendanceReceipt),
    /// Attempt failed.
    Error(FlowFailure),
}

impl FlowState {
    /// Stable name of the state.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::RequestingLocation => "requesting-location",
            Self::Submitting => "submitting",
            Self::Success(_) => "success",
            Self::Error(_) => "error",
        }
    }

    /// Work is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::RequestingLocation | Self::Submitting)
    }

    /// The attempt has an outcome and needs a reset.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }

    /// The error kind, for the error state.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error(failure) => Some(failure.kind()),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(failure) => write!(f, "error({})", failure.kind()),
            other => f.write_str(other.name()),
        }
    }
}

/// Why a scan did not start an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoredReason {
    /// Another attempt is in flight.
    Busy,
    /// The previous outcome hasn't been acknowledged with a reset.
    AwaitingReset,
    /// The flow was closed.
    Closed,
}

/// Result of [`AttendanceFlow::scan`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// No attempt was started.
    Ignored(IgnoredReason),
    /// The attempt ended in this (published) state.
    Completed(FlowState),
    /// The attempt ended after the flow was closed; nothing was published.
    Abandoned(FlowState),
}

#[derive(Debug, Default)]
struct FlowInner {
    state: FlowState,
    cached_location: Option<UserLocation>,
    closed: bool,
}

/// Coordinates scan, location and submission for one screen.
#[derive(Debug)]
pub struct AttendanceFlow<S, T> {
    provider: GeolocationProvider<S>,
    submitter: AttendanceSubmitter<T>,
    location_config: LocationConfig,
    inner: Mutex<FlowInner>,
    state_tx: watch::Sender<FlowState>,
}

/// Holds an attempt that has published a busy state.
///
/// Dropping it before the attempt publishes its outcome, e.g. when the
/// `scan` future is cancelled by a timeout or `select!`, returns an open
/// flow to scanning.
struct Attempt<'a, S, T> {
    flow: &'a AttendanceFlow<S, T>,
}

impl<S, T> Drop for Attempt<'_, S, T> {
    fn drop(&mut self) {
        let mut inner = self.flow.lock();
        if inner.closed || !inner.state.is_busy() {
            return;
        }
        warn!(state = %inner.state, "Attendance attempt cancelled; back to scanning");
        self.flow.publish(&mut inner, FlowState::Scanning);
    }
}

impl<S, T> AttendanceFlow<S, T> {
    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set and publish a state under an already held lock.
    fn publish(&self, inner: &mut FlowInner, next: FlowState) -> bool {
        if inner.closed {
            debug!(state = %next, "Flow closed; dropping state update");
            return false;
        }
        debug!(from = %inner.state, to = %next, "Flow transition");
        inner.state = next.clone();
        self.state_tx.send_replace(next);
        true
    }
}

impl<S: LocationSource, T: Transport> AttendanceFlow<S, T> {
    /// Create a flow in the idle state.
    #[must_use]
    pub fn new(
        provider: GeolocationProvider<S>,
        submitter: AttendanceSubmitter<T>,
        location_config: LocationConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(FlowState::Idle);
        Self {
            provider,
            submitter,
            location_config,
            inner: Mutex::new(FlowInner::default()),
            state_tx,
        }
    }

    fn transition(&self, next: FlowState) -> bool {
        let mut inner = self.lock();
        self.publish(&mut inner, next)
    }

    fn finish(&self, next: FlowState) -> ScanOutcome {
        if self.transition(next.clone()) {
            ScanOutcome::Completed(next)
        } else {
            ScanOutcome::Abandoned(next)
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.lock().state.clone()
    }

    /// Receive every published state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state_tx.subscribe()
    }

    /// The tier used for location fixes.
    #[must_use]
    pub fn location_config(&self) -> &LocationConfig {
        &self.location_config
    }

    /// The location provider.
    #[must_use]
    pub fn provider(&self) -> &GeolocationProvider<S> {
        &self.provider
    }

    /// The submitter.
    #[must_use]
    pub fn submitter(&self) -> &AttendanceSubmitter<T> {
        &self.submitter
    }

    /// Move from idle to scanning. No effect in any other state.
    pub fn start_scanning(&self) {
        let mut inner = self.lock();
        if inner.state == FlowState::Idle {
            self.publish(&mut inner, FlowState::Scanning);
        }
    }

    /// Remember a location for upcoming scans.
    pub fn set_location(&self, location: UserLocation) {
        self.lock().cached_location = Some(location);
    }

    /// Forget the remembered location.
    pub fn clear_location(&self) {
        self.lock().cached_location = None;
    }

    /// The remembered location, fresh or not.
    #[must_use]
    pub fn cached_location(&self) -> Option<UserLocation> {
        self.lock().cached_location
    }

    /// Ask for location permission ahead of the first scan.
    pub async fn request_location_permission(&self) -> PermissionState {
        self.provider.request_permission().await
    }

    /// Acquire a location now and remember it, without touching the state.
    ///
    /// # Errors
    ///
    /// Returns the location failure; the cache is left as it was.
    pub async fn refresh_location(&self) -> Result<UserLocation, AttendanceError> {
        let location = self.provider.current_location(&self.location_config).await?;
        self.set_location(location);
        Ok(location)
    }

    /// Handle a scanned payload.
    ///
    /// Runs the whole attempt and returns its outcome; observers see each
    /// intermediate state.
    pub async fn scan(&self, raw: &str) -> ScanOutcome {
        let cached = {
            let mut inner = self.lock();
            if inner.closed {
                return ScanOutcome::Ignored(IgnoredReason::Closed);
            }
            if inner.state.is_busy() {
                debug!(state = %inner.state, "Scan ignored; attempt in flight");
                return ScanOutcome::Ignored(IgnoredReason::Busy);
            }
            if inner.state.is_terminal() {
                debug!(state = %inner.state, "Scan ignored; waiting for reset");
                return ScanOutcome::Ignored(IgnoredReason::AwaitingReset);
            }

            if let Err(invalid) = QrCode::parse(raw) {
                info!(raw = ?raw, "Scanned payload is not an event QR code");
                let next = FlowState::Error(AttendanceError::from(invalid).into());
                self.publish(&mut inner, next.clone());
                return ScanOutcome::Completed(next);
            }

            let cached = inner
                .cached_location
                .filter(|location| location.is_fresh(&self.location_config, Utc::now()));
            let next = if cached.is_some() {
                FlowState::Submitting
            } else {
                FlowState::RequestingLocation
            };
            self.publish(&mut inner, next);
            cached
        };
        let _attempt = Attempt { flow: self };

        let location = if let Some(location) = cached {
            debug!("Using cached location");
            location
        } else {
            match self.provider.current_location(&self.location_config).await {
                Ok(location) => {
                    let mut inner = self.lock();
                    if !self.publish(&mut inner, FlowState::Submitting) {
                        // Nothing was sent yet; don't start a submission for a closed screen.
                        return ScanOutcome::Ignored(IgnoredReason::Closed);
                    }
                    inner.cached_location = Some(location);
                    location
                }
                Err(err) => {
                    warn!(error = %err, "Location unavailable for attendance");
                    let failure = AttendanceError::Location(err).into();
                    return self.finish(FlowState::Error(failure));
                }
            }
        };

        let next = match self.submitter.submit(raw, &location).await {
            Ok(receipt) => FlowState::Success(receipt),
            Err(err) => FlowState::Error(err.into()),
        };
        self.finish(next)
    }

    /// Leave a terminal state and scan again.
    ///
    /// Returns `false` while an attempt is in flight or after close; the
    /// state is unchanged in that case.
    pub fn reset(&self) -> bool {
        let mut inner = self.lock();
        if inner.closed || inner.state.is_busy() {
            return false;
        }
        if inner.state != FlowState::Scanning {
            self.publish(&mut inner, FlowState::Scanning);
        }
        true
    }

    /// Tear the flow down. In-flight work is not aborted.
    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            info!(state = %inner.state, "Attendance flow closed");
            inner.closed = true;
            inner.cached_location = None;
        }
    }

    /// True after [`AttendanceFlow::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
