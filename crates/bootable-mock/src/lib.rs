//! Deterministic bootable implementation for tests: records start/shutdown
//! calls in a shared log and supports injected delays and failures.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conifer_bootable::Bootable;
use tokio::time::sleep;

/// Shared, ordered record of calls made against a set of mock bootables.
///
/// Entries are `"<service>:<op>"` strings in call order, so tests can assert
/// both issuance order and per-service call counts across many services.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, service: &str, op: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("{service}:{op}"));
    }

    /// All entries in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Service names that received the given op, in call order.
    #[must_use]
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        let suffix = format!(":{op}");
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.strip_suffix(&suffix).map(ToString::to_string))
            .collect()
    }

    /// How many times the given service received the given op.
    #[must_use]
    pub fn count(&self, service: &str, op: &str) -> usize {
        let needle = format!("{service}:{op}");
        self.entries()
            .into_iter()
            .filter(|entry| *entry == needle)
            .count()
    }
}

/// A scripted bootable for kernel and deployment tests.
#[derive(Debug)]
pub struct MockBootable {
    name: String,
    log: CallLog,
    running: AtomicBool,
    start_delay: Option<Duration>,
    shutdown_delay: Option<Duration>,
    failing_start: bool,
    failing_shutdown: bool,
    start_failures_remaining: AtomicU32,
}

impl MockBootable {
    /// Creates a mock that starts and stops cleanly.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            running: AtomicBool::new(false),
            start_delay: None,
            shutdown_delay: None,
            failing_start: false,
            failing_shutdown: false,
            start_failures_remaining: AtomicU32::new(0),
        }
    }

    /// Sleeps for the given duration inside every `start` call.
    #[must_use]
    pub const fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Sleeps for the given duration inside every `shutdown` call.
    #[must_use]
    pub const fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = Some(delay);
        self
    }

    /// Makes every `start` call fail.
    #[must_use]
    pub const fn with_failing_start(mut self) -> Self {
        self.failing_start = true;
        self
    }

    /// Makes every `shutdown` call fail.
    #[must_use]
    pub const fn with_failing_shutdown(mut self) -> Self {
        self.failing_shutdown = true;
        self
    }

    /// Makes the first `count` start calls fail before succeeding.
    #[must_use]
    pub fn with_start_failures(self, count: u32) -> Self {
        self.start_failures_remaining.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Bootable for MockBootable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.record(&self.name, "start");

        if let Some(delay) = self.start_delay {
            sleep(delay).await;
        }

        if self.failing_start {
            return Err(format!("{} failed to start", self.name).into());
        }

        if self
            .start_failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(format!("{} failed to start", self.name).into());
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.record(&self.name, "shutdown");

        if let Some(delay) = self.shutdown_delay {
            sleep(delay).await;
        }

        if self.failing_shutdown {
            return Err(format!("{} failed to shut down", self.name).into());
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
