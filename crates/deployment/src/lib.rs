//! Deployment pipeline for the conifer kernel.
//!
//! A deployment arrives as a raw JSON job document, moves through a small
//! sequential pipeline (parse and validate, resolve versions, merge into the
//! service graph), and ends either merged or rejected with a recorded cause.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod merge;
mod model;
mod packet;
mod parse;
mod pipeline;
mod resolver;

pub use error::{Error, Result};
pub use model::{DeploymentConfiguration, DeploymentPackageConfiguration, NameVersionPair};
pub use packet::{DeploymentPacket, PackageMetadata, PipelineState};
pub use pipeline::DeploymentPipeline;
pub use resolver::{PackageResolver, PassthroughResolver};
