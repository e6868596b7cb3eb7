//! The parse-and-validate step of the pipeline.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{DeploymentConfiguration, DeploymentPackageConfiguration};
use crate::packet::{DeploymentPacket, PackageMetadata};

/// Decodes the packet's raw job document, builds the linked package metadata
/// set, and records the target-filtered proposed package set on the packet.
///
/// On success the raw document is cleared from the packet; on failure it is
/// left in place and the packet is abandoned by the caller. Nothing else on
/// the packet is touched when this fails.
pub(crate) fn parse_and_validate(packet: &mut DeploymentPacket) -> Result<()> {
    info!("parsing and validating the job document");
    let raw = packet
        .job_document()
        .filter(|value| !value.is_null())
        .ok_or(Error::EmptyJobDocument)?;
    let config =
        DeploymentConfiguration::deserialize(raw).map_err(Error::MalformedJobDocument)?;
    debug!(
        deployment_id = %config.deployment_id,
        packages = config.packages.len(),
        targets = config.target_packages.len(),
        "job document decoded"
    );

    // Key configurations by name; later duplicates overwrite earlier ones,
    // matching a mapping's unique-key semantics.
    let mut name_to_config: HashMap<&str, &DeploymentPackageConfiguration> = HashMap::new();
    for package in &config.packages {
        name_to_config.insert(package.package_name.as_str(), package);
    }

    let mut packages = HashMap::with_capacity(name_to_config.len());
    for (name, package) in &name_to_config {
        let depends_on = package
            .dependent_packages
            .iter()
            .flatten()
            // A dependency naming a package absent from this document is
            // dropped rather than failing the deployment. Known gap: see
            // DESIGN.md for the stricter-validation candidate.
            .filter(|pair| name_to_config.contains_key(pair.package_name.as_str()))
            .map(|pair| pair.package_name.clone())
            .collect();
        packages.insert(
            (*name).to_string(),
            PackageMetadata {
                name: (*name).to_string(),
                resolved_version: package.resolved_version.clone(),
                version_constraint: package.version_constraint.clone(),
                parameters: package.parameters.clone(),
                depends_on,
            },
        );
    }

    // The proposed set is only the top-level targets; everything else stays
    // reachable through dependency edges.
    let mut proposed = Vec::new();
    for target in &config.target_packages {
        if packages.contains_key(target) && !proposed.contains(target) {
            proposed.push(target.clone());
        }
    }

    packet.set_parsed(
        config.deployment_id,
        config.timestamp,
        packages,
        proposed,
    );
    // The raw document is no longer needed; drop it to bound peak memory.
    packet.clear_job_document();
    Ok(())
}
