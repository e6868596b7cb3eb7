//! On-device orchestration kernel: owns the graph of named, interdependent
//! services, drives dependency-safe startup and shutdown, and tracks each
//! service's lifecycle state.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod event;
mod graph;
mod lifecycle;
mod service;
mod state;

pub use error::{Error, Result};
pub use event::KernelEvent;
pub use state::ServiceState;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use conifer_bootable::BootableRegistry;
use tokio::sync::{Mutex, broadcast};
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::service::{DependencyWatch, Service};

/// Behavior knobs for the kernel.
#[derive(Clone, Debug)]
pub struct KernelOptions {
    /// How long a starting service may wait for its hard dependencies.
    pub dependency_timeout: Duration,

    /// Automatic restart policy applied when a service errors.
    pub restart_policy: RestartPolicy,

    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            dependency_timeout: Duration::from_secs(60),
            restart_policy: RestartPolicy::default(),
            event_capacity: 128,
        }
    }
}

/// How many automatic restarts an errored service gets before it is marked
/// broken. Explicitly count-bounded so the policy is testable rather than
/// hard-coded.
#[derive(Clone, Copy, Debug)]
pub struct RestartPolicy {
    /// Automatic restart attempts allowed per healthy run.
    pub max_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self { max_restarts: 3 }
    }
}

/// A dependency declared at service registration time.
#[derive(Clone, Debug)]
pub struct DependencySpec {
    /// Name of the service depended on.
    pub name: String,
    /// State the dependency must reach before the dependent may start.
    pub required_state: ServiceState,
    /// Whether the edge gates startup and participates in cycle detection.
    pub hard: bool,
}

impl DependencySpec {
    /// A hard dependency requiring the target to be running.
    #[must_use]
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_state: ServiceState::Running,
            hard: true,
        }
    }

    /// A soft ordering edge that never gates startup.
    #[must_use]
    pub fn soft(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_state: ServiceState::New,
            hard: false,
        }
    }
}

/// A service plus its declared dependencies, as registered in one batch.
#[derive(Clone, Debug)]
pub struct ServiceSpec {
    /// Unique service name; must have an implementation in the registry.
    pub name: String,
    /// Declared dependency edges.
    pub dependencies: Vec<DependencySpec>,
}

impl ServiceSpec {
    /// A spec with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn with_dependency(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// The orchestration kernel. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Kernel {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) graph: Mutex<DependencyGraph>,
    pub(crate) services: Mutex<HashMap<String, Arc<Service>>>,
    pub(crate) registry: BootableRegistry,
    pub(crate) options: KernelOptions,
    pub(crate) events: broadcast::Sender<KernelEvent>,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutdown_started: AtomicBool,
}

impl Kernel {
    /// Creates a kernel over an explicitly constructed implementation
    /// registry.
    #[must_use]
    pub fn new(registry: BootableRegistry, options: KernelOptions) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity);
        Self {
            inner: Arc::new(Inner {
                graph: Mutex::new(DependencyGraph::new()),
                services: Mutex::new(HashMap::new()),
                registry,
                options,
                events,
                tracker: TaskTracker::new(),
                shutdown_started: AtomicBool::new(false),
            }),
        }
    }

    /// Registers one service with its declared dependencies.
    ///
    /// # Errors
    ///
    /// See [`Self::register_services`].
    pub async fn register_service(
        &self,
        name: impl Into<String>,
        dependencies: Vec<DependencySpec>,
    ) -> Result<()> {
        self.register_services(&[ServiceSpec {
            name: name.into(),
            dependencies,
        }])
        .await
    }

    /// Registers a batch of services atomically: either the whole batch is
    /// merged into the dependency graph or the graph is left exactly as it
    /// was.
    ///
    /// Dependency targets are auto-created as graph nodes; they become
    /// startable once registered with their own spec. Re-registering an
    /// existing service updates its edge set and keeps its lifecycle state.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownService`] if any spec has no
    /// implementation in the registry, or with [`Error::Cycle`] if a hard
    /// edge in the batch would close a cycle.
    pub async fn register_services(&self, specs: &[ServiceSpec]) -> Result<()> {
        let mut executors = Vec::with_capacity(specs.len());
        for spec in specs {
            let executor = self
                .inner
                .registry
                .get(&spec.name)
                .ok_or_else(|| Error::UnknownService(spec.name.clone()))?;
            executors.push(executor);
        }

        {
            let mut graph = self.inner.graph.lock().await;
            let mut scratch = graph.clone();
            for spec in specs {
                scratch.upsert_node(&spec.name);
                for dep in &spec.dependencies {
                    scratch.add_dependency_auto(
                        &spec.name,
                        &dep.name,
                        dep.required_state,
                        dep.hard,
                    )?;
                }
            }
            *graph = scratch;
        }

        let mut services = self.inner.services.lock().await;
        for (spec, executor) in specs.iter().zip(executors) {
            if !services.contains_key(&spec.name) {
                debug!(service = %spec.name, "registering service");
                services.insert(
                    spec.name.clone(),
                    Service::new(
                        spec.name.clone(),
                        executor,
                        &self.inner.options,
                        self.inner.events.clone(),
                        self.inner.tracker.clone(),
                    ),
                );
            }
        }
        Ok(())
    }

    /// Removes a service that nothing depends on anymore.
    ///
    /// Callers are expected to have stopped the service first; removal does
    /// not issue a stop.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NodeInUse`] while other services still hold
    /// dependency edges onto it, or [`Error::UnknownNode`] if it was never
    /// registered.
    pub async fn remove_service(&self, name: &str) -> Result<()> {
        self.inner.graph.lock().await.remove_node(name)?;
        self.inner.services.lock().await.remove(name);
        Ok(())
    }

    /// The current lifecycle state of a service.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownService`] if no such service is
    /// registered.
    pub async fn current_state(&self, name: &str) -> Result<ServiceState> {
        self.inner
            .services
            .lock()
            .await
            .get(name)
            .map(|service| service.state())
            .ok_or_else(|| Error::UnknownService(name.to_string()))
    }

    /// The most recent error recorded for a service, if any.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownService`] if no such service is
    /// registered.
    pub async fn last_error(&self, name: &str) -> Result<Option<String>> {
        self.inner
            .services
            .lock()
            .await
            .get(name)
            .map(|service| service.last_error())
            .ok_or_else(|| Error::UnknownService(name.to_string()))
    }

    /// Service names in dependency-safe order (dependencies first).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Cycle`] if the graph holds a hard cycle.
    pub async fn ordered_dependencies(&self) -> Result<Vec<String>> {
        self.inner.graph.lock().await.topological_order()
    }

    /// Subscribes to the lifecycle event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves a service plus watch handles for its dependencies, as
    /// declared in the graph at this moment.
    async fn start_context(
        &self,
        name: &str,
    ) -> Result<(Arc<Service>, Vec<DependencyWatch>)> {
        let edges = self.inner.graph.lock().await.dependencies_of(name)?.to_vec();

        let services = self.inner.services.lock().await;
        let service = services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;

        let mut watches = Vec::with_capacity(edges.len());
        for edge in edges {
            match services.get(&edge.target) {
                Some(dependency) => watches.push(DependencyWatch {
                    name: edge.target,
                    required: edge.required_state,
                    hard: edge.hard,
                    receiver: dependency.subscribe_state(),
                }),
                // A hard dependency that exists as a node but was never
                // registered with an implementation can never become ready.
                None if edge.hard => return Err(Error::UnknownService(edge.target)),
                None => {}
            }
        }
        Ok((service, watches))
    }
}
