//! DataSink trait - in-process consumer interface
//!
//! Subprocess sinks are driven by the supervisor; everything else implements
//! this trait and is invoked directly by the dispatcher.

use async_trait::async_trait;

use crate::ContractError;

/// In-process consumer of framed protocol lines
#[async_trait]
pub trait DataSink: Send {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Handle one unit of framed lines, each newline-terminated
    ///
    /// Returns acknowledgement text, possibly empty.
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, lines: &[String]) -> Result<String, ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
