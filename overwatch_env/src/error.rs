//! Error types for the Overwatch environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to a collaborator.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The projector could not map a raw coordinate into world space
    #[error("Projection error: {0}")]
    Projection(String),

    /// The host channel refused or failed to deliver a message
    #[error("Host channel error: {0}")]
    HostChannel(String),

    /// Message encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnvError {
    /// Creates a projection error.
    pub fn projection(msg: impl Into<String>) -> Self {
        Self::Projection(msg.into())
    }

    /// Creates a host channel error.
    pub fn host(msg: impl Into<String>) -> Self {
        Self::HostChannel(msg.into())
    }
}
