//! Supervisor error types

use thiserror::Error;

/// Subprocess supervision errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Command line had no program
    #[error("empty command line")]
    EmptyCommand,

    /// Process could not be started
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Pipe I/O failed
    #[error("io error on '{process}': {source}")]
    Io {
        process: String,
        #[source]
        source: std::io::Error,
    },

    /// The stderr watchdog classified the process as crashed
    #[error("process '{process}' has crashed")]
    Crashed { process: String },

    /// stdin was already closed
    #[error("process '{process}' is closed")]
    Closed { process: String },
}

impl SupervisorError {
    pub(crate) fn io(process: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            process: process.into(),
            source,
        }
    }

    /// Whether the watchdog saw a crash signature
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed { .. })
    }
}
