//! # Contracts
//!
//! Frozen interface contracts shared by every crate: rows, protocol messages,
//! schema documents, the producer/sink/checkpoint traits and the error taxonomy.
//! All business crates depend on this crate; reverse dependencies are prohibited.
//!
//! ## Wire Model
//! - One JSON message per line (`SCHEMA`, `RECORD`, `STATE`)
//! - A SCHEMA line describes the RECORD lines that follow on the same stream

mod blueprint;
mod error;
mod message;
mod record;
mod schema;
mod sink;
mod source;

pub use blueprint::*;
pub use error::*;
pub use message::Message;
pub use record::{checkpoint_value, KeyProperties, Record};
pub use schema::{FieldSchema, FieldType, SchemaDocument};
pub use sink::DataSink;
pub use source::{CheckpointStore, RowSource};
