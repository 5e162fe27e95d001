//! Dispatcher - main loop fanning each producer unit out to every sink

use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use contracts::{
    default_histogram_buckets, ContractError, DeliveryMode, DispatchConfig, Message,
    SchemaEmission, SinkConfig, SinkType,
};
use framing::{null_typed_fields, Frame};
use observability::{MetricsRegistry, MetricsSnapshot, UnitMetrics};
use supervisor::{CrashEvent, CrashPolicy, Terminator};
use tap::Producer;

use crate::error::DispatcherError;
use crate::handle::{Sink, SinkHandle};
use crate::sinks::{FileSink, LogSink};
use crate::transform::{Retyper, Transform, Transformed};
use crate::upstream::Upstream;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub mode: DeliveryMode,
    /// Refuse units whose schema has `null`-typed fields
    pub reject_null_schema: bool,
    /// Echo forwarded lines and acknowledgements at info level
    pub debug: bool,
    /// Delay before terminating after a sink crash; zero raises instead
    pub graceful_shutdown: Duration,
    /// Longest wait for a subprocess sink's acknowledgement line
    pub drain_timeout: Duration,
    /// Used when re-framing a transformed external producer
    pub schema_emission: SchemaEmission,
    pub stamp_time_extracted: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatcherConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            mode: config.mode,
            reject_null_schema: config.reject_null_schema,
            debug: config.debug,
            graceful_shutdown: Duration::from_secs(config.graceful_shutdown_secs),
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
            schema_emission: config.schema_emission,
            stamp_time_extracted: config.stamp_time_extracted,
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    producer: Producer,
    sinks: Vec<Sink>,
    registry: Option<MetricsRegistry>,
    transform: Option<Transform>,
    terminator: Option<Terminator>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder reading from `producer`
    pub fn new(producer: impl Into<Producer>) -> Self {
        Self {
            config: DispatcherConfig::default(),
            producer: producer.into(),
            sinks: Vec::new(),
            registry: None,
            transform: None,
            terminator: None,
        }
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a sink; delivery follows registration order
    pub fn sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sinks(mut self, sinks: impl IntoIterator<Item = Sink>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Registry the producer and sink series are created in
    pub fn registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(contracts::Record) -> Result<Transformed, ContractError> + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Replace the process exit used on the graceful crash path
    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Spawn subprocesses and register metrics
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(sink_count = self.sinks.len()))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        if self.sinks.is_empty() {
            return Err(DispatcherError::NoSinks);
        }
        let registry = match self.registry {
            Some(registry) => registry,
            None => MetricsRegistry::new(&default_histogram_buckets())?,
        };
        let (crash_tx, crash_rx) = mpsc::unbounded_channel();

        let producer_metrics = registry.unit_metrics(self.producer.name())?;
        let mut handles = Vec::with_capacity(self.sinks.len());
        for sink in self.sinks {
            handles.push(SinkHandle::open(sink, &registry, crash_tx.clone())?);
        }
        let upstream = Upstream::start(self.producer, crash_tx)?;

        let mut policy = CrashPolicy::new(self.config.graceful_shutdown);
        if let Some(terminator) = self.terminator {
            policy = policy.with_terminator(terminator);
        }

        Ok(Dispatcher {
            retyper: Retyper::new(self.config.schema_emission, self.config.stamp_time_extracted),
            config: self.config,
            upstream,
            producer_metrics,
            handles,
            transform: self.transform,
            policy,
            crashes: crash_rx,
            registry,
        })
    }
}

/// Create an in-process or subprocess sink from configuration
#[instrument(
    name = "dispatcher_create_sink",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub async fn create_sink(config: &SinkConfig) -> Result<Sink, DispatcherError> {
    match config.sink_type {
        SinkType::Command => config
            .command
            .clone()
            .map(Sink::Command)
            .ok_or_else(|| DispatcherError::sink_creation(&config.name, "command sink without command")),
        SinkType::Log => Ok(Sink::handler(LogSink::new(&config.name))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(Sink::handler(sink))
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Units delivered to every sink
    pub units: u64,
    pub producer: MetricsSnapshot,
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

/// The main Dispatcher that fans out producer units to sinks
pub struct Dispatcher {
    config: DispatcherConfig,
    upstream: Upstream,
    producer_metrics: UnitMetrics,
    handles: Vec<SinkHandle>,
    transform: Option<Transform>,
    retyper: Retyper,
    policy: CrashPolicy,
    crashes: mpsc::UnboundedReceiver<CrashEvent>,
    registry: MetricsRegistry,
}

impl Dispatcher {
    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics()))
            .collect()
    }

    pub fn producer_metrics(&self) -> MetricsSnapshot {
        self.producer_metrics.snapshot()
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Run the dispatcher main loop
    ///
    /// Pulls units until the producer ends, then closes every sink. A crash
    /// reported by any watchdog is handled by the crash policy and ends the
    /// run with `SinkCrash`.
    #[instrument(name = "dispatcher_run", skip(self), fields(mode = ?self.config.mode))]
    pub async fn run(mut self) -> Result<RunReport, DispatcherError> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut units: u64 = 0;
        loop {
            let next = tokio::select! {
                biased;
                Some(event) = self.crashes.recv() => return Err(self.on_crash(event).await),
                next = self.upstream.next_unit(self.transform.as_ref(), &mut self.retyper) => next,
            };
            let frames = match next {
                Ok(Some(frames)) => frames,
                Ok(None) => break,
                Err(e) => return Err(self.on_failure(e).await),
            };
            if frames.is_empty() {
                continue;
            }

            if let Err(e) = self.dispatch_unit(frames).await {
                return Err(self.on_failure(e).await);
            }
            units += 1;

            if units % 100 == 0 {
                debug!(units, "Dispatcher progress");
            }
        }

        info!(units, "Producer exhausted, shutting down");
        let report = RunReport {
            units,
            producer: self.producer_metrics(),
            sinks: self.metrics(),
        };
        let Self {
            upstream,
            handles,
            policy,
            mut crashes,
            ..
        } = self;
        upstream.close().await;
        for handle in handles {
            handle.shutdown().await;
        }
        // Watchdogs have finished once every process is reaped
        if let Ok(event) = crashes.try_recv() {
            return Err(apply_policy(&policy, event).await);
        }
        info!("Dispatcher shutdown complete");
        Ok(report)
    }

    async fn dispatch_unit(&mut self, frames: Vec<Frame>) -> Result<(), DispatcherError> {
        if self.config.reject_null_schema {
            reject_null_schema(&frames)?;
        }

        let lines: Vec<String> = frames.into_iter().map(Frame::into_line).collect();
        let payload: usize = lines.iter().map(String::len).sum();
        self.producer_metrics.record(1, payload);
        if self.config.debug {
            for line in &lines {
                info!(line = %line.trim_end(), "Forwarding");
            }
        }

        let wait = self.config.drain_timeout;
        let debug = self.config.debug;
        match self.config.mode {
            DeliveryMode::Sequential => {
                for handle in &mut self.handles {
                    let ack = handle.deliver(&lines, wait).await?;
                    echo_ack(debug, handle.name(), &ack);
                }
            }
            DeliveryMode::Concurrent => {
                let lines = &lines;
                let acks = try_join_all(self.handles.iter_mut().map(|handle| async move {
                    let ack = handle.deliver(lines, wait).await?;
                    Ok::<_, DispatcherError>((handle.name().to_string(), ack))
                }))
                .await?;
                for (name, ack) in acks {
                    echo_ack(debug, &name, &ack);
                }
            }
        }

        self.upstream.commit().await?;
        Ok(())
    }

    /// Route a failed unit through the crash policy when a sink crashed
    async fn on_failure(&mut self, error: DispatcherError) -> DispatcherError {
        if error.is_crash() {
            if let Some(event) = self.crashes.recv().await {
                return self.on_crash(event).await;
            }
        }
        error!(error = %error, "Dispatch failed");
        error
    }

    async fn on_crash(&self, event: CrashEvent) -> DispatcherError {
        apply_policy(&self.policy, event).await
    }
}

async fn apply_policy(policy: &CrashPolicy, event: CrashEvent) -> DispatcherError {
    error!(process = %event.process, signature = %event.signature, "Crash reported");
    DispatcherError::Contract(policy.handle(event).await)
}

fn echo_ack(debug: bool, sink: &str, ack: &str) {
    if debug {
        info!(sink = %sink, ack = %ack, "Acknowledged");
    }
}

/// Fail when a SCHEMA frame of the unit has `null`-typed fields
fn reject_null_schema(frames: &[Frame]) -> Result<(), ContractError> {
    for frame in frames {
        if let Message::Schema { stream, schema, .. } = frame.message() {
            let fields = null_typed_fields(schema);
            if !fields.is_empty() {
                error!(stream = %stream, fields = ?fields, line = %frame.line().trim_end(), "Rejected schema with null-typed fields");
                return Err(ContractError::NullSchemaField {
                    stream: stream.clone(),
                    fields,
                });
            }
        }
    }
    Ok(())
}
