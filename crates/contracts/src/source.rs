//! Producer-side traits: row sources and checkpoint backends

use async_trait::async_trait;

use crate::ContractError;

/// In-process producer of raw rows
///
/// `emit` may wait (e.g. a polling reader sleeping between exhausted pages).
/// `Ok(None)` signals end-of-stream.
#[async_trait]
pub trait RowSource: Send {
    /// Next raw row; anything but a JSON object is rejected by the tap
    async fn emit(&mut self) -> Result<Option<serde_json::Value>, ContractError>;
}

/// Persisted resume position, typically the last-seen key value
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the stored position
    ///
    /// # Errors
    /// Any failure, including "nothing stored yet"; callers treat it as no checkpoint.
    async fn pull(&self) -> Result<String, ContractError>;

    /// Replace the stored position
    async fn push(&self, value: &str) -> Result<(), ContractError>;
}
