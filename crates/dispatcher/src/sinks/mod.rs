//! Built-in in-process sinks
//!
//! Contains LogSink and FileSink.

mod file;
mod log;

pub use self::file::FileSink;
pub use self::log::LogSink;
