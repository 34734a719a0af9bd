//! Lifecycle error types.

use thiserror::Error;

use cfbroker_cluster::ClusterError;
use cfbroker_state::StateError;

/// Errors that can occur while managing service instances.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to load state: {0}")]
    FailedToLoadState(#[source] StateError),

    #[error("failed to save state: {0}")]
    FailedToSaveState(#[source] StateError),

    #[error("instance {0} already exists")]
    InstanceExists(String),

    #[error("instance {0} does not exist")]
    InstanceDoesNotExist(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
