//! Per-producer / per-sink throughput metrics
//!
//! Each named unit (the producer or one sink) owns three series keyed by its
//! normalized name:
//!
//! - `total_<slug>`: counter of records processed
//! - `data_size_<slug>`: summary of payload size (KB)
//! - `data_size_histogram_<slug>`: histogram of payload size (KB)
//!
//! Series live in an explicit [`MetricsRegistry`], not in a global recorder,
//! so several pipelines can share one process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use metrics::{Counter, Histogram, Key, KeyName, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use thiserror::Error;
use tracing::{error, info};

use crate::naming::normalize;
use crate::stats::{RunningStats, StatsSummary};

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

const HISTOGRAM_PREFIX: &str = "data_size_histogram_";

/// Metrics registry errors
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Two units normalized to the same key set
    #[error("metrics name '{0}' is already registered")]
    DuplicateName(String),

    /// Prometheus recorder/exporter could not be built
    #[error("failed to build prometheus recorder: {0}")]
    Build(#[from] BuildError),
}

/// Explicit registry of throughput series, optionally exported over HTTP
#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    /// In-memory registry with the given payload-size buckets (KB)
    pub fn new(buckets: &[f64]) -> Result<Self, MetricsError> {
        let recorder = Self::builder(buckets)?.build_recorder();
        Ok(Self::from_recorder(recorder))
    }

    /// Registry served on `0.0.0.0:<port>/metrics`
    ///
    /// Must be called inside a Tokio runtime; the exporter runs as a task.
    pub fn with_exporter(port: u16, buckets: &[f64]) -> Result<Self, MetricsError> {
        let (recorder, exporter) = Self::builder(buckets)?
            .with_http_listener(([0, 0, 0, 0], port))
            .build()?;

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                error!(port, error = ?e, "Prometheus exporter stopped");
            }
        });
        info!(port, "Prometheus metrics endpoint initialized");

        Ok(Self::from_recorder(recorder))
    }

    fn builder(buckets: &[f64]) -> Result<PrometheusBuilder, MetricsError> {
        Ok(PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Prefix(HISTOGRAM_PREFIX.to_string()), buckets)?)
    }

    fn from_recorder(recorder: PrometheusRecorder) -> Self {
        let handle = recorder.handle();
        Self {
            recorder: Arc::new(recorder),
            handle,
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Register the three series of a unit named `name`
    ///
    /// # Errors
    /// `DuplicateName` when another unit already normalized to the same slug.
    pub fn unit_metrics(&self, name: &str) -> Result<UnitMetrics, MetricsError> {
        let slug = normalize(name);
        {
            let mut claimed = self
                .claimed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !claimed.insert(slug.clone()) {
                return Err(MetricsError::DuplicateName(slug));
            }
        }

        let total = format!("total_{slug}");
        let summary = format!("data_size_{slug}");
        let histogram = format!("{HISTOGRAM_PREFIX}{slug}");

        self.describe_counter(&total, format!("total rows {slug}"));
        self.describe_histogram(&summary, format!("summary of data size {slug} (KB)"));
        self.describe_histogram(&histogram, format!("histogram of data size {slug} (KB)"));

        Ok(UnitMetrics {
            total: self
                .recorder
                .register_counter(&Key::from_name(total), &METADATA),
            data_size: self
                .recorder
                .register_histogram(&Key::from_name(summary), &METADATA),
            data_size_histogram: self
                .recorder
                .register_histogram(&Key::from_name(histogram), &METADATA),
            slug,
            count: 0,
            size_kb: RunningStats::default(),
        })
    }

    fn describe_counter(&self, name: &str, help: String) {
        self.recorder
            .describe_counter(KeyName::from(name.to_string()), None, SharedString::from(help));
    }

    fn describe_histogram(&self, name: &str, help: String) {
        self.recorder
            .describe_histogram(KeyName::from(name.to_string()), None, SharedString::from(help));
    }

    /// Prometheus exposition text of every registered series
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Series owned by one producer or sink
///
/// Single writer: only the owner updates it, on the dispatch path.
#[derive(Debug)]
pub struct UnitMetrics {
    slug: String,
    total: Counter,
    data_size: Histogram,
    data_size_histogram: Histogram,
    count: u64,
    size_kb: RunningStats,
}

impl UnitMetrics {
    /// Normalized name the series are keyed by
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Record `records` processed with a combined payload of `payload_bytes`
    pub fn record(&mut self, records: u64, payload_bytes: usize) {
        let kb = payload_bytes as f64 / 1000.0;
        self.total.increment(records);
        self.data_size.record(kb);
        self.data_size_histogram.record(kb);
        self.count += records;
        self.size_kb.push(kb);
    }

    /// Records processed so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total: self.count,
            data_size_kb: StatsSummary::from(&self.size_kb),
        }
    }
}

/// Snapshot of a unit's metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub data_size_kb: StatsSummary,
}
