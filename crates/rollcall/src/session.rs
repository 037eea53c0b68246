//! Signed-in user context.
//!
//! A [`SessionStore`] is created at startup, filled at sign-in and cleared at
//! sign-out. It is shared by reference with whatever needs the credential
//! (the HTTP transport), so there is no process-wide token variable.
//! [`SessionStore::refresh`] confirms a stored token with the server.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{response, ApiRequest, Transport};
use crate::error::AttendanceError;

/// API path that confirms the token and returns the user.
pub const CHECK_STATUS_PATH: &str = "/check-status";

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Server identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Role, e.g. `"admin"` or `"user"`.
    pub role: String,
    /// Institutional employee or student number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
}

impl UserProfile {
    /// True for administrators.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

/// Credential and profile of one signed-in session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    user: Option<UserProfile>,
}

impl Session {
    /// A session holding a bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: None,
        }
    }

    /// Attach the user profile.
    #[must_use]
    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The signed-in user, when known.
    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    user: UserProfile,
    token: String,
}

/// Holds the current session, if any.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    /// An empty store (signed out).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }

    /// Replace the current session (sign-in).
    pub fn begin(&self, session: Session) {
        if let Ok(mut guard) = self.current.write() {
            info!(user = ?session.user().map(|u| u.id), "Session started");
            *guard = Some(session);
        }
    }

    /// Drop the current session (sign-out).
    pub fn clear(&self) {
        if let Ok(mut guard) = self.current.write() {
            if guard.take().is_some() {
                info!("Session cleared");
            } else {
                debug!("Session clear requested with no active session");
            }
        }
    }

    /// Bearer token of the current session.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.token().to_string()))
    }

    /// Profile of the current user.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().and_then(|s| s.user().cloned()))
    }

    /// True while a session is active.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Confirm the current token with the server.
    ///
    /// On success the session holds the token the server returned, which may
    /// be a rotated one, and the user's profile, available from
    /// [`SessionStore::user`]. An unauthorized answer ends the session; other
    /// failures leave it untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AttendanceError::Unauthorized`] when there is no session or
    /// the server rejects the token, otherwise the mapped failure.
    pub async fn refresh<T: Transport>(&self, transport: &T) -> Result<(), AttendanceError> {
        if !self.is_authenticated() {
            return Err(AttendanceError::Unauthorized {
                message: "no session token".to_string(),
            });
        }

        let response = transport.send(ApiRequest::get(CHECK_STATUS_PATH)).await?;
        match response::decode::<StatusPayload>(&response) {
            Ok(status) => {
                self.begin(Session::new(status.token).with_user(status.user));
                Ok(())
            }
            Err(err) => {
                if err.kind().requires_reauthentication() {
                    warn!("Server rejected the session token");
                    self.clear();
                }
                Err(err)
            }
        }
    }
}
