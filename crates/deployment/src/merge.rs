//! Merging a validated deployment into the kernel's service graph.

use std::collections::HashSet;

use conifer_kernel::{DependencySpec, Kernel, ServiceSpec};
use tracing::debug;

use crate::error::Result;
use crate::packet::DeploymentPacket;

/// Registers one service per package in the proposed set's dependency
/// closure, with hard requires-running edges mirroring the package links.
///
/// The batch goes through the kernel's atomic registration, so either the
/// whole deployment lands in the graph or the graph keeps its pre-merge
/// shape (a cycle or a missing implementation rejects the lot).
pub(crate) async fn merge(kernel: &Kernel, packet: &DeploymentPacket) -> Result<()> {
    let mut specs = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut frontier: Vec<&str> = packet
        .proposed_packages()
        .iter()
        .map(String::as_str)
        .collect();

    while let Some(name) = frontier.pop() {
        if !seen.insert(name) {
            continue;
        }
        let Some(package) = packet.packages().get(name) else {
            continue;
        };
        specs.push(ServiceSpec {
            name: package.name.clone(),
            dependencies: package
                .depends_on
                .iter()
                .map(DependencySpec::running)
                .collect(),
        });
        frontier.extend(package.depends_on.iter().map(String::as_str));
    }

    debug!(services = specs.len(), "merging deployment into service graph");
    kernel.register_services(&specs).await?;
    Ok(())
}
