//! The unit of work representing one in-flight deployment.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Package metadata built from a job document, keyed by package name inside
/// the owning packet. Dependencies are recorded by name and resolve only
/// against other packages from the same document.
#[derive(Clone, Debug, PartialEq)]
pub struct PackageMetadata {
    /// Package name.
    pub name: String,
    /// Concrete version, once known.
    pub resolved_version: Option<String>,
    /// Declared version constraint expression.
    pub version_constraint: Option<String>,
    /// Opaque configuration parameters owned by the package.
    pub parameters: serde_json::Map<String, Value>,
    /// Names of same-document packages this one depends on.
    pub depends_on: Vec<String>,
}

/// States of the deployment pipeline.
///
/// One tagged variant per state; the shared working data lives on the packet
/// and pipeline context rather than on the states themselves.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PipelineState {
    /// Deployment received, nothing examined yet.
    Received,
    /// Parsing and validating the job document.
    ParseAndValidate,
    /// Waiting on the external package resolver.
    Resolve,
    /// Merging the resolved package set into the service graph.
    Merge,
    /// Terminal: the deployment was merged.
    Complete,
    /// Terminal: the deployment was rejected, with the recorded cause.
    Failed(String),
}

impl PipelineState {
    /// Short name for logging and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ParseAndValidate => "parse-and-validate",
            Self::Resolve => "resolve",
            Self::Merge => "merge",
            Self::Complete => "complete",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether the pipeline has finished with this packet.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

/// One in-flight deployment document moving through the pipeline.
#[derive(Debug)]
pub struct DeploymentPacket {
    request_id: Uuid,
    deployment_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    job_document: Option<Value>,
    packages: HashMap<String, PackageMetadata>,
    proposed_packages: Vec<String>,
    state: PipelineState,
}

impl DeploymentPacket {
    pub(crate) fn new(job_document: Option<Value>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deployment_id: None,
            created_at: None,
            job_document,
            packages: HashMap::new(),
            proposed_packages: Vec::new(),
            state: PipelineState::Received,
        }
    }

    /// Locally generated id for this submission, independent of the
    /// document contents.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Deployment id from the document, available after validation.
    #[must_use]
    pub fn deployment_id(&self) -> Option<&str> {
        self.deployment_id.as_deref()
    }

    /// Deployment creation timestamp from the document, available after
    /// validation.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Whether the raw job document is still held by this packet. Cleared
    /// after a successful parse to bound peak memory; retained when parsing
    /// fails and the packet is abandoned.
    #[must_use]
    pub const fn has_job_document(&self) -> bool {
        self.job_document.is_some()
    }

    /// Every package parsed out of the document, fully linked, whether or
    /// not it is a top-level target.
    #[must_use]
    pub const fn packages(&self) -> &HashMap<String, PackageMetadata> {
        &self.packages
    }

    /// Names of the packages that are top-level deployment targets, in
    /// document order.
    #[must_use]
    pub fn proposed_packages(&self) -> &[String] {
        &self.proposed_packages
    }

    /// Current pipeline state.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Recorded cause, when the packet was rejected.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            PipelineState::Failed(cause) => Some(cause),
            _ => None,
        }
    }

    pub(crate) fn job_document(&self) -> Option<&Value> {
        self.job_document.as_ref()
    }

    pub(crate) fn clear_job_document(&mut self) {
        self.job_document = None;
    }

    pub(crate) fn set_parsed(
        &mut self,
        deployment_id: String,
        created_at: DateTime<Utc>,
        packages: HashMap<String, PackageMetadata>,
        proposed_packages: Vec<String>,
    ) {
        self.deployment_id = Some(deployment_id);
        self.created_at = Some(created_at);
        self.packages = packages;
        self.proposed_packages = proposed_packages;
    }

    pub(crate) fn packages_mut(&mut self) -> &mut HashMap<String, PackageMetadata> {
        &mut self.packages
    }

    pub(crate) fn set_state(&mut self, state: PipelineState) {
        self.state = state;
    }
}
