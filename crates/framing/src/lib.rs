//! # Framing
//!
//! Schema inference and protocol framing.
//!
//! - [`SchemaInference`] folds rows into a widening [`contracts::SchemaDocument`]
//! - [`frame`] / [`parse`] convert between rows and SCHEMA + RECORD lines
//! - [`Framer`] applies the schema emission policy per stream
//! - [`null_typed_fields`] backs the null-schema validation gate

mod framer;
mod gate;
mod inference;

pub use framer::{frame, frame_at, parse, Frame, FramedPair, Framer};
pub use gate::null_typed_fields;
pub use inference::{infer_value, widen, SchemaInference, SchemaTracker};
