//! # Observability
//!
//! Tracing initialisation, metrics-key naming and the Prometheus-backed
//! throughput registry.
//!
//! ## Usage
//!
//! ```ignore
//! observability::init()?;
//! let registry = observability::MetricsRegistry::from_config(&blueprint.metrics)?;
//! let mut sink_metrics = registry.unit_metrics("target-csv --config c.json")?;
//! sink_metrics.record(1, line.len());
//! ```

pub mod metrics;
pub mod naming;
pub mod stats;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::metrics::{MetricsError, MetricsRegistry, MetricsSnapshot, UnitMetrics};
pub use crate::naming::normalize;
pub use crate::stats::{RunningStats, StatsSummary};

impl MetricsRegistry {
    /// Registry per config: exported when a non-zero port is set
    pub fn from_config(config: &contracts::MetricsConfig) -> Result<Self, MetricsError> {
        match config.port {
            Some(port) if port != 0 => Self::with_exporter(port, &config.histogram_buckets),
            _ => Self::new(&config.histogram_buckets),
        }
    }
}

/// Initialise tracing with defaults (JSON, `RUST_LOG` or `info`)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Level used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs
    #[default]
    Json,
    /// Human-readable
    Pretty,
    /// Single line
    Compact,
}

/// Initialise tracing with a custom configuration
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    }
    .context("Failed to initialize tracing subscriber")?;

    tracing::info!(log_format = ?config.log_format, "Observability initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_log_level, "info");
    }

    #[test]
    fn test_from_config_without_port_stays_in_memory() {
        let config = contracts::MetricsConfig {
            port: None,
            histogram_buckets: contracts::default_histogram_buckets(),
        };
        let registry = MetricsRegistry::from_config(&config).unwrap();
        let mut unit = registry.unit_metrics("tap").unwrap();
        unit.record(1, 10);
        assert!(registry.render().contains("total_tap 1"));
    }
}
