//! Cluster client error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the cluster management API client.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request to {path} failed: {message}")]
    Request { path: String, message: String },

    /// The cluster answered with a non-success status.
    #[error("{description}")]
    Rejected {
        status: u16,
        description: String,
        error_code: Option<String>,
    },

    /// The database did not reach the active state before the deadline.
    /// It may still be provisioning on the cluster.
    #[error("database {uid} did not become active within {waited:?}")]
    Timeout { uid: u64, waited: Duration },

    #[error("database {uid} creation failed on the cluster")]
    CreationFailed { uid: u64 },

    #[error("DNS address {0:?} does not contain a port")]
    MalformedAddress(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterError::Timeout { .. })
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
