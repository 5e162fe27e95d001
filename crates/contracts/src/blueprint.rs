//! PipelineBlueprint - Config Loader output
//!
//! Describes one producer, its sinks, the delivery policy and metrics export.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::KeyProperties;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Producer definition
    pub tap: TapConfig,

    /// Delivery policy
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Metrics export
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Consumers, in registration order
    pub sinks: Vec<SinkConfig>,
}

/// Producer definition: an external command or a JSON-lines file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Stream / metrics name of a file tap; defaults to the file stem
    #[serde(default)]
    pub name: Option<String>,

    /// Key field(s) every row must carry
    pub key: KeyProperties,

    /// Command line of an external producer emitting framed lines
    #[serde(default)]
    pub command: Option<String>,

    /// JSON-lines file read in-process, one row per line
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Explicit schema document (JSON); disables inference
    #[serde(default)]
    pub schema: Option<PathBuf>,

    /// File holding the resume position
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
}

/// Sink delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One sink after another, in registration order
    #[default]
    Sequential,
    /// All sinks at once, joined before the next unit
    Concurrent,
}

/// When a SCHEMA line precedes a RECORD line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaEmission {
    /// Before every record
    #[default]
    EveryRecord,
    /// Only when the schema differs from the last one sent on the stream
    OnChange,
}

/// When the producer position is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    /// As soon as rows are retrieved, independent of sinks
    #[default]
    OnRetrieve,
    /// Only after every sink acknowledged the unit
    AfterDelivery,
}

/// Delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Refuse to forward schemas with `null`-typed fields
    #[serde(default)]
    pub reject_null_schema: bool,

    /// Echo forwarded lines and acknowledgements to the log
    #[serde(default)]
    pub debug: bool,

    /// Delay before terminating after a sink crash; 0 raises instead
    #[serde(default)]
    pub graceful_shutdown_secs: u64,

    /// How long a drain read may wait for sink output
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    #[serde(default)]
    pub schema_emission: SchemaEmission,

    #[serde(default)]
    pub checkpoint_mode: CheckpointMode,

    /// Fill `time_extracted` on framed records
    #[serde(default)]
    pub stamp_time_extracted: bool,
}

fn default_drain_timeout_ms() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            reject_null_schema: false,
            debug: false,
            graceful_shutdown_secs: 0,
            drain_timeout_ms: default_drain_timeout_ms(),
            schema_emission: SchemaEmission::default(),
            checkpoint_mode: CheckpointMode::default(),
            stamp_time_extracted: false,
        }
    }
}

/// Metrics export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus HTTP port (None = no exporter)
    #[serde(default = "default_metrics_port")]
    pub port: Option<u16>,

    /// Buckets of the payload-size histogram, in KB
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

fn default_metrics_port() -> Option<u16> {
    Some(8000)
}

/// Default payload-size buckets (KB)
pub fn default_histogram_buckets() -> Vec<f64> {
    vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Command line, for `command` sinks
    #[serde(default)]
    pub command: Option<String>,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// External process fed on stdin
    Command,
    /// Log output
    Log,
    /// Append lines to a file
    File,
}
