//! Serde schema for the inbound job document.
//!
//! The document arrives as an already-decoded JSON mapping; this module
//! gives it a typed shape. Unknown fields are tolerated, missing optional
//! fields default, and anything structurally wrong surfaces as a single
//! parse error wrapping the serde cause.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The full deployment configuration carried by a job document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfiguration {
    /// Identity of the deployment this document describes.
    pub deployment_id: String,

    /// When the deployment was created, as epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Declared package configurations.
    #[serde(default)]
    pub packages: Vec<DeploymentPackageConfiguration>,

    /// Names of the packages that are top-level deployment targets.
    #[serde(default)]
    pub target_packages: Vec<String>,
}

/// One package's configuration within a job document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPackageConfiguration {
    /// Unique package name within the document.
    pub package_name: String,

    /// Concrete version, when the document already carries one.
    #[serde(default)]
    pub resolved_version: Option<String>,

    /// Version constraint expression to be resolved externally.
    #[serde(default)]
    pub version_constraint: Option<String>,

    /// Packages this one depends on, by name/version pair.
    #[serde(default)]
    pub dependent_packages: Option<Vec<NameVersionPair>>,

    /// Opaque configuration parameters owned by the package.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// A dependency reference inside a package configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameVersionPair {
    /// Name of the package depended on.
    pub package_name: String,

    /// Version expectation, if any.
    #[serde(default)]
    pub version: Option<String>,
}
