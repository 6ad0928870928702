// src/core/errors.rs

//! Defines the primary error type for the broker.

use thiserror::Error;

/// The main error enum, representing all possible failures within the broker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WardenError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("incomplete frame")]
    IncompleteFrame,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("no available clusters for request '{0}'")]
    NoAvailableClusters(String),

    #[error("cluster not available")]
    ClusterNotAvailable,

    #[error("unable to process request")]
    WaiterClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for WardenError {
    fn from(e: std::io::Error) -> Self {
        WardenError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::MalformedFrame(e.to_string())
    }
}
