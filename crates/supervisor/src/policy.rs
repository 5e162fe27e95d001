//! What happens after a sink crash

use std::sync::Arc;
use std::time::Duration;

use contracts::ContractError;
use tracing::error;

use crate::watchdog::CrashEvent;

/// Ends the program after a graceful crash delay
pub type Terminator = Arc<dyn Fn(&CrashEvent) + Send + Sync>;

/// Terminator exiting the process with status 1
pub fn exit_process() -> Terminator {
    Arc::new(|_| std::process::exit(1))
}

/// Crash handling policy
///
/// With a non-zero `graceful_shutdown` the crash is logged, the policy waits
/// that long and then calls the terminator. With zero it hands the crash back
/// as [`ContractError::SinkCrash`] for the caller to raise.
#[derive(Clone)]
pub struct CrashPolicy {
    graceful_shutdown: Duration,
    terminator: Terminator,
}

impl std::fmt::Debug for CrashPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashPolicy")
            .field("graceful_shutdown", &self.graceful_shutdown)
            .finish_non_exhaustive()
    }
}

impl Default for CrashPolicy {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl CrashPolicy {
    pub fn new(graceful_shutdown: Duration) -> Self {
        Self {
            graceful_shutdown,
            terminator: exit_process(),
        }
    }

    /// Replace the terminator (tests, embedding)
    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn graceful_shutdown(&self) -> Duration {
        self.graceful_shutdown
    }

    /// Apply the policy to `event`
    ///
    /// The returned error is what the caller should raise. On the graceful
    /// path with the default terminator this never returns.
    pub async fn handle(&self, event: CrashEvent) -> ContractError {
        if self.graceful_shutdown.is_zero() {
            return event.into_error();
        }

        error!(
            process = %event.process,
            signature = %event.signature,
            delay_secs = self.graceful_shutdown.as_secs_f64(),
            stderr = %event.excerpt(),
            "Sink crashed, terminating after graceful shutdown delay"
        );
        tokio::time::sleep(self.graceful_shutdown).await;
        (self.terminator)(&event);
        event.into_error()
    }
}
