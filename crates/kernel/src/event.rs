//! Structured lifecycle events published on the kernel's broadcast stream.

use chrono::{DateTime, Utc};

use crate::state::ServiceState;

/// Events that represent state changes in the service lifecycle.
///
/// Subscribers receive these in issuance order; slow subscribers may observe
/// lag on the broadcast channel and should treat the stream as best-effort.
#[derive(Clone, Debug)]
pub enum KernelEvent {
    /// A service moved from one lifecycle state to another.
    ServiceStateChanged {
        /// The service that transitioned.
        service: String,
        /// State before the transition.
        old: ServiceState,
        /// State after the transition.
        new: ServiceState,
        /// When the transition happened.
        at: DateTime<Utc>,
    },

    /// A service reported an error.
    ServiceErrored {
        /// The failing service.
        service: String,
        /// Recorded cause.
        cause: String,
        /// Whether an automatic restart will be attempted.
        will_restart: bool,
        /// When the error was reported.
        at: DateTime<Utc>,
    },

    /// A service failed while being shut down. Never escalated; the
    /// remaining shutdown sequence continues regardless.
    ServiceShutdownError {
        /// The failing service.
        service: String,
        /// Recorded cause.
        cause: String,
        /// When the failure was observed.
        at: DateTime<Utc>,
    },
}

impl KernelEvent {
    /// The service this event concerns.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::ServiceStateChanged { service, .. }
            | Self::ServiceErrored { service, .. }
            | Self::ServiceShutdownError { service, .. } => service,
        }
    }
}
