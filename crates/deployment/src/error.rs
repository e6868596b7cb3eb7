use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The deployment carried no job document at all.
    #[error("job document cannot be empty")]
    EmptyJobDocument,

    /// The job document could not be decoded into the expected schema.
    #[error("unable to parse the job document")]
    MalformedJobDocument(#[source] serde_json::Error),

    /// `proceed` was called on a terminal pipeline state.
    #[error("deployment pipeline cannot proceed from state {state}")]
    InvalidTransition {
        /// Name of the offending state.
        state: &'static str,
    },

    /// The package resolver rejected the proposed package set.
    #[error("package resolution failed: {0}")]
    Resolver(String),

    /// Merging the deployment into the service graph failed.
    #[error("failed to merge deployment into the service graph: {0}")]
    Merge(#[from] conifer_kernel::Error),
}
