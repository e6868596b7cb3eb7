//! Per-service lifecycle state machine.
//!
//! Each service owns its own state; only the orchestrator and the service's
//! spawned bring-up/teardown tasks request transitions. Dependents gate on a
//! watch channel mirroring the state, so readiness never requires polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use conifer_bootable::Bootable;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::KernelOptions;
use crate::RestartPolicy;
use crate::error::{Error, Result};
use crate::event::KernelEvent;
use crate::state::ServiceState;

/// A dependency the start path must wait on, resolved against the graph at
/// issuance time.
pub(crate) struct DependencyWatch {
    pub name: String,
    pub required: ServiceState,
    pub hard: bool,
    pub receiver: watch::Receiver<ServiceState>,
}

pub(crate) struct Service {
    name: String,
    bootable: Arc<dyn Bootable>,
    state: watch::Sender<ServiceState>,
    restart_policy: RestartPolicy,
    restarts: AtomicU32,
    start_in_flight: AtomicBool,
    dependency_timeout: Duration,
    last_error: Mutex<Option<String>>,
    events: broadcast::Sender<KernelEvent>,
    tracker: TaskTracker,
}

impl Service {
    pub(crate) fn new(
        name: String,
        bootable: Arc<dyn Bootable>,
        options: &KernelOptions,
        events: broadcast::Sender<KernelEvent>,
        tracker: TaskTracker,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ServiceState::New);
        Arc::new(Self {
            name,
            bootable,
            state,
            restart_policy: options.restart_policy,
            restarts: AtomicU32::new(0),
            start_in_flight: AtomicBool::new(false),
            dependency_timeout: options.dependency_timeout,
            last_error: Mutex::new(None),
            events,
            tracker,
        })
    }

    pub(crate) fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Issues a start request. Returns once the request is accepted; the
    /// actual bring-up (dependency wait, implementation start) runs on a
    /// spawned task and is reported through the event stream.
    pub(crate) fn request_start(self: Arc<Self>, deps: Vec<DependencyWatch>) -> Result<()> {
        let current = self.state();
        if matches!(current, ServiceState::Running | ServiceState::Stopping) {
            debug!(service = %self.name, state = %current, "start requested but service is already active");
            return Ok(());
        }
        if current == ServiceState::Broken {
            return Err(Error::Broken(self.name.clone()));
        }
        if self.start_in_flight.swap(true, Ordering::SeqCst) {
            debug!(service = %self.name, "start already in flight");
            return Ok(());
        }

        self.set_state(ServiceState::Installed);
        let tracker = self.tracker.clone();
        tracker.spawn(async move {
            self.run_start(deps).await;
            self.start_in_flight.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Issues a stop request. The transition to `Stopping` happens before
    /// this returns; the implementation teardown runs on the returned task.
    /// A stop of a `Broken`, already-stopping, or finished service is a
    /// no-op that completes immediately.
    pub(crate) fn request_stop(self: Arc<Self>) -> JoinHandle<()> {
        let current = self.state();
        if matches!(
            current,
            ServiceState::Broken | ServiceState::Stopping | ServiceState::Finished
        ) {
            debug!(service = %self.name, state = %current, "stop requested but there is nothing to stop");
            return self.tracker.spawn(async {});
        }

        self.set_state(ServiceState::Stopping);
        let tracker = self.tracker.clone();
        tracker.spawn(async move { self.run_stop().await })
    }

    async fn run_start(&self, deps: Vec<DependencyWatch>) {
        let mut own = self.state.subscribe();
        loop {
            tokio::select! {
                result = self.try_start(&deps) => match result {
                    Ok(()) => {
                        if self.try_set_running() {
                            self.restarts.store(0, Ordering::SeqCst);
                        }
                        return;
                    }
                    Err(err) => {
                        if !self.report_error(&err) {
                            return;
                        }
                    }
                },
                _ = own.wait_for(|state| {
                    matches!(state, ServiceState::Stopping | ServiceState::Finished)
                }) => {
                    debug!(service = %self.name, "start superseded by a stop request");
                    return;
                }
            }
        }
    }

    async fn try_start(&self, deps: &[DependencyWatch]) -> Result<()> {
        self.set_state(ServiceState::Installed);
        self.await_dependencies(deps).await?;
        self.bootable.start().await.map_err(|err| Error::Start {
            service: self.name.clone(),
            cause: err.to_string(),
        })
    }

    /// Waits until every hard dependency satisfies its required state, with
    /// one overall deadline for the whole set. A dependency whose state
    /// channel closed (service removed) counts as a timeout.
    async fn await_dependencies(&self, deps: &[DependencyWatch]) -> Result<()> {
        let deadline = Instant::now() + self.dependency_timeout;
        for dep in deps.iter().filter(|dep| dep.hard) {
            let mut receiver = dep.receiver.clone();
            let required = dep.required;
            let ready = receiver.wait_for(|state| state.satisfies(required));
            match timeout_at(deadline, ready).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => {
                    return Err(Error::DependencyTimeout {
                        service: self.name.clone(),
                        dependency: dep.name.clone(),
                        required,
                    });
                }
            }
        }
        Ok(())
    }

    async fn run_stop(&self) {
        match self.bootable.shutdown().await {
            Ok(()) => self.set_state(ServiceState::Finished),
            Err(err) => {
                let cause = Error::Shutdown {
                    service: self.name.clone(),
                    cause: err.to_string(),
                }
                .to_string();
                error!(
                    event = "service-shutdown-error",
                    service = %self.name,
                    error = %cause,
                    "service failed to shut down"
                );
                *self.last_error.lock() = Some(cause.clone());
                self.set_state(ServiceState::Errored);
                let _ = self.events.send(KernelEvent::ServiceShutdownError {
                    service: self.name.clone(),
                    cause,
                    at: Utc::now(),
                });
            }
        }
    }

    /// Records the cause, moves to `Errored`, and decides whether the
    /// restart budget allows another attempt. Escalates to `Broken` once the
    /// budget is exhausted. Returns whether the caller should retry.
    fn report_error(&self, cause: &Error) -> bool {
        let cause_text = cause.to_string();
        warn!(service = %self.name, error = %cause_text, "service reported an error");
        *self.last_error.lock() = Some(cause_text.clone());
        self.set_state(ServiceState::Errored);

        let attempts = self.restarts.fetch_add(1, Ordering::SeqCst);
        let will_restart = attempts < self.restart_policy.max_restarts;
        let _ = self.events.send(KernelEvent::ServiceErrored {
            service: self.name.clone(),
            cause: cause_text,
            will_restart,
            at: Utc::now(),
        });

        if !will_restart {
            error!(service = %self.name, "restart budget exhausted, marking service broken");
            self.set_state(ServiceState::Broken);
        }
        will_restart
    }

    /// Moves to `Running` unless a stop raced in while the implementation
    /// was being started. Returns whether the transition happened.
    fn try_set_running(&self) -> bool {
        let mut old = ServiceState::New;
        let changed = self.state.send_if_modified(|state| {
            if matches!(*state, ServiceState::Stopping | ServiceState::Finished) {
                return false;
            }
            old = *state;
            *state = ServiceState::Running;
            true
        });
        if changed {
            debug!(service = %self.name, %old, new = %ServiceState::Running, "service state changed");
            let _ = self.events.send(KernelEvent::ServiceStateChanged {
                service: self.name.clone(),
                old,
                new: ServiceState::Running,
                at: Utc::now(),
            });
        }
        changed
    }

    fn set_state(&self, new: ServiceState) {
        let old = self.state.send_replace(new);
        if old == new {
            return;
        }
        debug!(service = %self.name, %old, %new, "service state changed");
        let _ = self.events.send(KernelEvent::ServiceStateChanged {
            service: self.name.clone(),
            old,
            new,
            at: Utc::now(),
        });
    }
}
