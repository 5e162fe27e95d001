//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tapline - pipe one record producer into many sinks
#[derive(Parser, Debug)]
#[command(
    name = "tapline",
    author,
    version,
    about = "Record pipeline: one producer, many sinks",
    long_about = "Runs a producer (an external command or a JSON-lines file), frames its rows \n\
                  as SCHEMA/RECORD lines and fans every unit out to the configured sinks, \n\
                  with per-sink throughput metrics and crash supervision."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TAPLINE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TAPLINE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level used when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline until the producer ends
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "tapline.toml", env = "TAPLINE_CONFIG")]
    pub config: PathBuf,

    /// Override the delivery mode from configuration
    #[arg(long, value_enum, env = "TAPLINE_MODE")]
    pub mode: Option<ModeArg>,

    /// Echo forwarded lines and sink acknowledgements
    #[arg(long)]
    pub debug: bool,

    /// Metrics server port (0 = disabled); overrides configuration
    #[arg(long, env = "TAPLINE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Validate configuration and exit without running the pipeline
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "tapline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Delivery mode override
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Sequential,
    Concurrent,
}

impl From<ModeArg> for contracts::DeliveryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => Self::Sequential,
            ModeArg::Concurrent => Self::Concurrent,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
