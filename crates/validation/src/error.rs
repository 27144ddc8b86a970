//! Error taxonomy for node validation.

use thiserror::Error;

/// Errors surfaced by validators and the execution/polling core.
///
/// The variants map onto distinct failure classes with different handling:
/// transport and cluster errors mean we never got an answer, assertion
/// errors mean the node answered with the wrong state, setup errors are
/// bugs in the check itself rather than in the system under test.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The remote channel could not be established or the exec call itself
    /// failed. There is no command outcome to inspect.
    #[error("transport failure: {0}")]
    Transport(#[source] anyhow::Error),

    /// The command ran but the observed state did not match the expectation.
    #[error("{0}")]
    Assertion(String),

    /// The check itself is malformed (test-authoring error), e.g. asking
    /// whether a file excludes the empty string.
    #[error("test setup error: {0}")]
    Setup(String),

    /// A convergence poll reached its deadline without observing the target
    /// condition.
    #[error("timed out after {elapsed_secs}s waiting for condition {condition:?} on node {node:?}")]
    Timeout {
        condition: String,
        node: String,
        elapsed_secs: u64,
    },

    /// The enclosing scenario was cancelled while a poll was in flight.
    #[error("cancelled while waiting for condition {condition:?} on node {node:?}")]
    Cancelled { condition: String, node: String },

    /// A cluster API lookup failed outside a poll loop. Inside a poll loop
    /// the same failure is logged and tolerated instead.
    #[error("cluster API error: {0}")]
    Cluster(#[source] anyhow::Error),
}

impl ValidationError {
    /// True for failures that indicate a broken check rather than a broken
    /// node.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ValidationError>;
