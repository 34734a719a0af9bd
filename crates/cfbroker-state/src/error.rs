//! Error types for the broker state persisters.

use thiserror::Error;

/// Result type alias for persister operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while loading or saving the broker state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
