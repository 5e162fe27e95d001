//! Dispatcher error types

use observability::MetricsError;
use supervisor::SupervisorError;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Nothing to deliver to
    #[error("no sinks registered, add one before building the dispatcher")]
    NoSinks,

    /// Contract violation, framing or sink failure
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),

    /// Subprocess failure
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Metrics registration failure
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether a subprocess write failed because the process crashed
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Supervisor(e) if e.is_crash())
    }
}
