//! Per-service lifecycle states.

use std::fmt;

/// Lifecycle states a service moves through.
///
/// The happy path is `New -> Installed -> Running`, then
/// `Stopping -> Finished` on a clean stop. `Errored` is reachable from any
/// non-terminal state; `Broken` is terminal and entered once the automatic
/// restart budget is exhausted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ServiceState {
    /// Registered but never asked to start.
    New,
    /// Start has been requested; waiting on dependencies or bring-up.
    Installed,
    /// The underlying implementation is up.
    Running,
    /// A stop has been requested and is in flight.
    Stopping,
    /// Cleanly stopped.
    Finished,
    /// The implementation reported a failure.
    Errored,
    /// Restart budget exhausted; requires operator intervention.
    Broken,
}

impl ServiceState {
    /// Whether a start request is valid from this state.
    #[must_use]
    pub const fn can_request_start(self) -> bool {
        matches!(
            self,
            Self::New | Self::Installed | Self::Finished | Self::Errored
        )
    }

    /// Whether this state satisfies a dependency edge's required state.
    ///
    /// "Required or better": an `Installed` requirement is met by anything
    /// that has been through install, while a `Running` requirement is met
    /// only by a service that is actually running right now.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        match required {
            Self::New => true,
            Self::Installed => matches!(
                self,
                Self::Installed | Self::Running | Self::Stopping | Self::Finished
            ),
            Self::Running => matches!(self, Self::Running),
            _ => (self as u8) == (required as u8),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Installed => "installed",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
            Self::Errored => "errored",
            Self::Broken => "broken",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceState;

    #[test]
    fn running_requirement_is_met_only_by_running() {
        assert!(ServiceState::Running.satisfies(ServiceState::Running));
        assert!(!ServiceState::Finished.satisfies(ServiceState::Running));
        assert!(!ServiceState::Installed.satisfies(ServiceState::Running));
        assert!(!ServiceState::Errored.satisfies(ServiceState::Running));
    }

    #[test]
    fn installed_requirement_is_met_by_later_states() {
        assert!(ServiceState::Installed.satisfies(ServiceState::Installed));
        assert!(ServiceState::Running.satisfies(ServiceState::Installed));
        assert!(ServiceState::Finished.satisfies(ServiceState::Installed));
        assert!(!ServiceState::New.satisfies(ServiceState::Installed));
        assert!(!ServiceState::Broken.satisfies(ServiceState::Installed));
    }

    #[test]
    fn new_requirement_is_always_met() {
        assert!(ServiceState::Broken.satisfies(ServiceState::New));
        assert!(ServiceState::New.satisfies(ServiceState::New));
    }

    #[test]
    fn start_validity() {
        assert!(ServiceState::New.can_request_start());
        assert!(ServiceState::Finished.can_request_start());
        assert!(ServiceState::Errored.can_request_start());
        assert!(!ServiceState::Running.can_request_start());
        assert!(!ServiceState::Stopping.can_request_start());
        assert!(!ServiceState::Broken.can_request_start());
    }
}
