//! Sink - a delivery target and its metrics

use std::time::Duration;

use contracts::DataSink;
use observability::{MetricsRegistry, MetricsSnapshot, UnitMetrics};
use supervisor::{CrashEvent, SupervisedProcess};
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use crate::error::DispatcherError;

/// A consumer of the framed stream
pub enum Sink {
    /// External program fed on stdin
    Command(String),
    /// In-process handler
    Handler(Box<dyn DataSink>),
}

impl Sink {
    /// Wrap an in-process handler
    pub fn handler(sink: impl DataSink + 'static) -> Self {
        Self::Handler(Box::new(sink))
    }

    /// Identifying name, before normalization
    pub fn name(&self) -> &str {
        match self {
            Self::Command(command) => command,
            Self::Handler(handler) => handler.name(),
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Self::Handler(handler) => f.debug_tuple("Handler").field(&handler.name()).finish(),
        }
    }
}

enum Target {
    Process(SupervisedProcess),
    Handler(Box<dyn DataSink>),
}

/// A running sink with its own metrics series
pub struct SinkHandle {
    name: String,
    target: Target,
    metrics: UnitMetrics,
}

impl SinkHandle {
    /// Start `sink`; subprocess crashes are reported on `crashes`
    #[instrument(name = "sink_handle_open", skip_all, fields(sink = %sink.name()))]
    pub fn open(
        sink: Sink,
        registry: &MetricsRegistry,
        crashes: mpsc::UnboundedSender<CrashEvent>,
    ) -> Result<Self, DispatcherError> {
        let name = sink.name().to_string();
        let metrics = registry.unit_metrics(&name)?;
        let target = match sink {
            Sink::Command(command) => Target::Process(SupervisedProcess::spawn(&command, crashes)?),
            Sink::Handler(handler) => Target::Handler(handler),
        };
        debug!(sink = %name, slug = metrics.slug(), "Sink opened");
        Ok(Self {
            name,
            target,
            metrics,
        })
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Deliver one unit of lines and return the acknowledgement
    ///
    /// Subprocess sinks are written, flushed, then drained: one reply line
    /// per written line, each awaited for at most `drain_wait`. No output is
    /// an empty acknowledgement.
    pub async fn deliver(
        &mut self,
        lines: &[String],
        drain_wait: Duration,
    ) -> Result<String, DispatcherError> {
        let ack = match &mut self.target {
            Target::Process(process) => {
                process.write_lines(lines).await?;
                process.drain_reply(lines.len(), drain_wait).await?.join("\n")
            }
            Target::Handler(handler) => handler.write(lines).await?,
        };

        let payload: usize = lines.iter().map(String::len).sum();
        self.metrics.record(1, payload);
        Ok(ack)
    }

    /// Close stdin and reap, or flush and close a handler
    ///
    /// Failures are logged, never returned.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        match self.target {
            Target::Process(process) => match process.close().await {
                Ok(status) if !status.success() => {
                    warn!(sink = %self.name, ?status, "Sink exited uncleanly");
                }
                Ok(_) => {}
                Err(e) => warn!(sink = %self.name, error = %e, "Sink close failed"),
            },
            Target::Handler(mut handler) => {
                if let Err(e) = handler.flush().await {
                    error!(sink = %self.name, error = %e, "Flush failed on shutdown");
                }
                if let Err(e) = handler.close().await {
                    error!(sink = %self.name, error = %e, "Close failed on shutdown");
                }
            }
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}
