use thiserror::Error;

/// Errors raised while resolving a workload reference.
#[derive(Debug, Error)]
pub enum RefError {
    /// The `api_version` field is not of the form `group/version` or `version`.
    #[error("invalid api_version {0:?}")]
    InvalidApiVersion(String),

    /// The reference carries no kind.
    #[error("workload reference has no kind")]
    EmptyKind,

    /// The reference carries no name.
    #[error("workload reference has no name")]
    EmptyName,
}
