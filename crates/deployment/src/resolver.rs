//! Version resolution collaborator interface.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::packet::PackageMetadata;

/// Resolves version constraints in a proposed package set to concrete
/// versions (and, in real deployments, artifact locations).
///
/// The pipeline only depends on this trait; the production implementation
/// lives outside this crate.
#[async_trait]
pub trait PackageResolver
where
    Self: Send + Sync + 'static,
{
    /// Fills in `resolved_version` for every package reachable from the
    /// proposed set.
    async fn resolve(
        &self,
        packages: &mut HashMap<String, PackageMetadata>,
        proposed: &[String],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Resolver that accepts whatever the document declared: a missing resolved
/// version falls back to the constraint expression verbatim. Suitable for
/// local development and tests only.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughResolver;

#[async_trait]
impl PackageResolver for PassthroughResolver {
    async fn resolve(
        &self,
        packages: &mut HashMap<String, PackageMetadata>,
        _proposed: &[String],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for package in packages.values_mut() {
            if package.resolved_version.is_none() {
                package.resolved_version = package.version_constraint.clone();
            }
        }
        Ok(())
    }
}
