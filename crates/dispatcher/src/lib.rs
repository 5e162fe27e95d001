//! # Dispatcher
//!
//! Fan-out stage of a pipeline.
//!
//! Responsibilities:
//! - Pull units from the producer (external process or in-process tap)
//! - Optionally transform records and re-infer their schema
//! - Deliver each unit to every sink, sequentially or concurrently
//! - Track per-sink metrics and react to sink crashes

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod sinks;
pub mod transform;
mod upstream;

pub use contracts::DataSink;
pub use dispatcher::{create_sink, Dispatcher, DispatcherBuilder, DispatcherConfig, RunReport};
pub use error::DispatcherError;
pub use handle::{Sink, SinkHandle};
pub use sinks::{FileSink, LogSink};
pub use transform::{Retyper, Transform, Transformed};
