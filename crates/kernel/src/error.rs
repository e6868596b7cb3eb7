use thiserror::Error;

use crate::state::ServiceState;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Adding a hard dependency edge would close a cycle.
    #[error("adding dependency {from} -> {to} would create a cycle")]
    Cycle {
        /// Service that would depend on `to`.
        from: String,
        /// Target of the rejected edge.
        to: String,
    },

    /// A graph mutation or query referenced a node that does not exist.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A node cannot be removed while other nodes hold edges onto it.
    #[error("node {name} still has dependents: {dependents:?}")]
    NodeInUse {
        /// The node that was asked to be removed.
        name: String,
        /// Nodes still depending on it.
        dependents: Vec<String>,
    },

    /// No implementation is registered for the given service name.
    #[error("no registered implementation for service: {0}")]
    UnknownService(String),

    /// A dependency never reached its required state within the wait budget.
    #[error("service {service} timed out waiting for dependency {dependency} to reach {required}")]
    DependencyTimeout {
        /// The gated service.
        service: String,
        /// The dependency that never became ready.
        dependency: String,
        /// The state the dependency was required to reach.
        required: ServiceState,
    },

    /// The service has exhausted its restart budget and cannot be started.
    #[error("service {0} is broken and cannot be restarted")]
    Broken(String),

    /// The underlying implementation failed to start.
    #[error("service {service} failed to start: {cause}")]
    Start {
        /// The failing service.
        service: String,
        /// Cause reported by the implementation.
        cause: String,
    },

    /// The underlying implementation failed to shut down.
    #[error("service {service} failed to shut down: {cause}")]
    Shutdown {
        /// The failing service.
        service: String,
        /// Cause reported by the implementation.
        cause: String,
    },
}
