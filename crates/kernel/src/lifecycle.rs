//! Bulk startup and shutdown across the whole service graph.
//!
//! Startup issues requests dependency-first; shutdown issues closes
//! dependent-first, exactly once per kernel instance, and is best-effort:
//! one bad service never short-circuits the rest of the sequence.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::Kernel;
use crate::error::Result;

impl Kernel {
    /// Starts every registered service, issuing start requests sequentially
    /// in topological order so dependencies are always asked to start before
    /// their dependents. Actual readiness is asynchronous and gated per
    /// service.
    ///
    /// # Errors
    ///
    /// Fails only if the topological order cannot be computed; that means a
    /// hard cycle slipped past mutation-time validation, which is a broken
    /// invariant rather than a runtime condition. Per-service start failures
    /// are isolated, logged, and reported on the event stream instead.
    pub async fn startup_all(&self) -> Result<()> {
        let order = self.inner.graph.lock().await.topological_order()?;
        info!(services = order.len(), "starting all services");

        for name in order {
            match self.start_context(&name).await {
                Ok((service, deps)) => {
                    if let Err(err) = service.request_start(deps) {
                        warn!(service = %name, error = %err, "failed to issue start request");
                    }
                }
                Err(err) => {
                    warn!(service = %name, error = %err, "cannot issue start request");
                }
            }
        }
        Ok(())
    }

    /// Stops every service in reverse topological order, waiting up to
    /// `timeout` total for the closes to finish.
    ///
    /// Runs at most once per kernel: later calls return immediately without
    /// re-querying the graph or re-issuing closes. Each close is an
    /// independent task; failures are logged as structured
    /// `service-shutdown-error` events and never stop the remaining closes
    /// from being issued. Closes still in flight when the timeout elapses
    /// are left running and report their outcome whenever they finish.
    ///
    /// # Errors
    ///
    /// Fails only if the topological order cannot be computed.
    pub async fn shutdown_all(&self, timeout: Duration) -> Result<()> {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!("shutdown already started, ignoring repeat request");
            return Ok(());
        }

        let order = self.inner.graph.lock().await.topological_order()?;
        info!(
            services = order.len(),
            timeout_secs = timeout.as_secs(),
            "shutting down all services"
        );

        let services = self.inner.services.lock().await.clone();
        let mut closes = Vec::with_capacity(order.len());
        for name in order.iter().rev() {
            if let Some(service) = services.get(name) {
                closes.push(Arc::clone(service).request_stop());
            }
        }

        match tokio::time::timeout(timeout, join_all(closes)).await {
            Ok(results) => {
                for result in results {
                    if let Err(err) = result {
                        error!(error = %err, "service shutdown task panicked");
                    }
                }
                info!("all services shut down");
            }
            Err(_) => {
                warn!("timed out waiting for services to shut down");
            }
        }
        Ok(())
    }
}
