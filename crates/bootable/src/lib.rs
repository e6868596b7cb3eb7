//! Abstract interface for bootable service implementations, plus the registry
//! the kernel uses to look executables up by service name.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Trait for bootable service implementations. The kernel treats these
/// opaquely: it only ever asks them to start, shut down, or report liveness.
#[async_trait]
pub trait Bootable
where
    Self: Send + Sync + 'static,
{
    /// Get the name of the bootable service.
    fn name(&self) -> &str;

    /// Start the bootable service.
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Shutdown the bootable service.
    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Whether the underlying implementation is currently running.
    async fn is_running(&self) -> bool;
}

/// Registry of bootable implementations keyed by service name.
///
/// Built once at process start and handed to the kernel by reference; there is
/// deliberately no global registry, so tests can construct their own.
#[derive(Clone, Default)]
pub struct BootableRegistry {
    entries: HashMap<String, Arc<dyn Bootable>>,
}

impl BootableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bootable under its own name, replacing any previous entry.
    pub fn register(&mut self, bootable: Arc<dyn Bootable>) {
        self.entries.insert(bootable.name().to_string(), bootable);
    }

    /// Looks up the implementation for a service name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Bootable>> {
        self.entries.get(name).cloned()
    }

    /// Whether an implementation is registered under the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all registered implementations.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl fmt::Debug for BootableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootableRegistry")
            .field("entries", &self.names())
            .finish()
    }
}
