use std::io;
use thiserror::Error;

/// Custom error type for the hostwatch daemon
#[derive(Error, Debug)]
pub enum HostwatchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot provider error: {0}")]
    Provider(String),

    #[error("Metric store error: {0}")]
    Store(String),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("GPU not available: {0}")]
    GpuNotAvailable(String),

    #[error("HTTP server error: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for the hostwatch daemon
pub type Result<T> = std::result::Result<T, HostwatchError>;

impl HostwatchError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        HostwatchError::Config(msg.into())
    }

    /// Create a snapshot provider error
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        HostwatchError::Provider(msg.into())
    }

    /// Create a metric store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        HostwatchError::Store(msg.into())
    }

    /// Create a notifier error
    pub fn notifier<S: Into<String>>(msg: S) -> Self {
        HostwatchError::Notifier(msg.into())
    }

    pub fn gpu_not_available<S: Into<String>>(msg: S) -> Self {
        HostwatchError::GpuNotAvailable(msg.into())
    }

    pub fn http<S: Into<String>>(msg: S) -> Self {
        HostwatchError::Http(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        HostwatchError::Other(msg.into())
    }
}
