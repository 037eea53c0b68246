//! `rollcall` - QR and geolocation based event attendance client
//!
//! This library validates scanned event QR codes, obtains the device location
//! within a bounded time, and registers attendance with the attendance
//! service, which decides whether the user was inside the event's radius.
//!
//! The pieces compose bottom-up: [`qr`] and [`geo`] are pure helpers,
//! [`location`] and [`api`] are the async seams to the platform and the
//! network, [`submit`] performs one submission, and [`flow`] drives a whole
//! scan-to-outcome attempt as an observable state machine.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod geo;
pub mod history;
pub mod kind;
pub mod location;
pub mod logging;
pub mod model;
pub mod qr;
pub mod session;
pub mod submit;

pub use api::{HttpTransport, Transport};
pub use config::Config;
pub use error::{AttendanceError, Error, Result};
pub use flow::{AttendanceFlow, FlowState, ScanOutcome};
pub use geo::Coordinates;
pub use kind::{ErrorKind, Remediation};
pub use location::{GeolocationProvider, LocationSource, LocationTier, UserLocation};
pub use logging::init_logging;
pub use model::{AttendanceRecord, Event, EventStatus};
pub use qr::QrCode;
pub use session::{Session, SessionStore, UserProfile};
pub use submit::{AttendanceReceipt, AttendanceSubmitter};
