//! The sequential deployment pipeline.

use std::sync::Arc;

use conifer_kernel::Kernel;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::merge;
use crate::packet::{DeploymentPacket, PipelineState};
use crate::parse;
use crate::resolver::PackageResolver;

/// Drives deployment packets through
/// `Received -> ParseAndValidate -> Resolve -> Merge -> Complete`, parking
/// them in `Failed` with a recorded cause on the first error.
///
/// The pipeline owns the collaborators every state needs (the kernel and the
/// resolver); states carry no data of their own.
pub struct DeploymentPipeline {
    kernel: Kernel,
    resolver: Arc<dyn PackageResolver>,
}

impl DeploymentPipeline {
    /// Creates a pipeline feeding the given kernel.
    pub fn new(kernel: Kernel, resolver: Arc<dyn PackageResolver>) -> Self {
        Self { kernel, resolver }
    }

    /// Accepts a raw job document and drives the packet until it is either
    /// merged or rejected. The returned packet is terminal.
    pub async fn submit_deployment(&self, job_document: Option<Value>) -> DeploymentPacket {
        let mut packet = DeploymentPacket::new(job_document);
        info!(request_id = %packet.request_id(), "deployment received");

        while self.can_proceed(&packet) {
            if let Err(err) = self.proceed(&mut packet).await {
                error!(
                    event = "deployment-failed",
                    request_id = %packet.request_id(),
                    state = packet.state().name(),
                    error = %err,
                    "deployment rejected"
                );
                packet.set_state(PipelineState::Failed(err.to_string()));
            }
        }

        if *packet.state() == PipelineState::Complete {
            info!(
                event = "deployment-complete",
                request_id = %packet.request_id(),
                deployment_id = packet.deployment_id().unwrap_or("unknown"),
                proposed = packet.proposed_packages().len(),
                "deployment merged"
            );
        }
        packet
    }

    /// Whether `proceed` may be called for the packet's current state. Must
    /// be checked before every `proceed` call.
    #[must_use]
    pub fn can_proceed(&self, packet: &DeploymentPacket) -> bool {
        !packet.state().is_terminal()
    }

    /// Runs the work of the packet's current state and advances it one step.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error; the caller records it on the packet
    /// as the terminal `Failed` state. Calling this on a terminal packet is
    /// an [`Error::InvalidTransition`].
    pub async fn proceed(&self, packet: &mut DeploymentPacket) -> Result<()> {
        match packet.state() {
            PipelineState::Received => {
                packet.set_state(PipelineState::ParseAndValidate);
                Ok(())
            }
            PipelineState::ParseAndValidate => {
                parse::parse_and_validate(packet)?;
                packet.set_state(PipelineState::Resolve);
                Ok(())
            }
            PipelineState::Resolve => {
                let proposed = packet.proposed_packages().to_vec();
                self.resolver
                    .resolve(packet.packages_mut(), &proposed)
                    .await
                    .map_err(|err| Error::Resolver(err.to_string()))?;
                packet.set_state(PipelineState::Merge);
                Ok(())
            }
            PipelineState::Merge => {
                merge::merge(&self.kernel, packet).await?;
                packet.set_state(PipelineState::Complete);
                Ok(())
            }
            PipelineState::Complete | PipelineState::Failed(_) => Err(Error::InvalidTransition {
                state: packet.state().name(),
            }),
        }
    }

    /// Abandons whatever the current state holds. Validation holds no
    /// external resources, so for the states covered here this only logs;
    /// states that own downloads or spawned work are expected to release
    /// them when the pipeline grows those stages.
    pub fn cancel(&self, packet: &DeploymentPacket) {
        debug!(
            request_id = %packet.request_id(),
            state = packet.state().name(),
            "deployment cancelled; nothing to release"
        );
    }
}
