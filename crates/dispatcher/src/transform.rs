//! Record transformation hook
//!
//! A [`Transform`] rewrites each record before delivery and may pin field
//! types. The schema sent downstream is re-inferred from transformed records.

use std::collections::HashMap;

use contracts::{ContractError, FieldType, KeyProperties, Message, Record, SchemaEmission};
use framing::{Frame, Framer, SchemaTracker};

/// Transformed record plus field types overriding inference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    pub record: Record,
    pub overrides: HashMap<String, FieldType>,
}

impl Transformed {
    pub fn with_override(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.overrides.insert(field.into(), field_type);
        self
    }
}

impl From<Record> for Transformed {
    fn from(record: Record) -> Self {
        Self {
            record,
            overrides: HashMap::new(),
        }
    }
}

/// Transformation callback
pub type Transform = Box<dyn Fn(Record) -> Result<Transformed, ContractError> + Send + Sync>;

#[derive(Debug, Default)]
struct StreamState {
    keys: Option<KeyProperties>,
    tracker: Option<SchemaTracker>,
    overrides: HashMap<String, FieldType>,
}

/// Re-frames already framed lines of an external producer through a [`Transform`]
///
/// SCHEMA lines only contribute their key properties; a new SCHEMA is
/// inferred per stream from the transformed records. STATE lines pass through.
#[derive(Debug)]
pub struct Retyper {
    framer: Framer,
    streams: HashMap<String, StreamState>,
}

impl Retyper {
    pub fn new(emission: SchemaEmission, stamp_time_extracted: bool) -> Self {
        Self {
            framer: Framer::new(emission).with_time_extracted(stamp_time_extracted),
            streams: HashMap::new(),
        }
    }

    /// Frames to forward in place of `frame`; may be empty
    ///
    /// # Errors
    /// `InvalidKeyProperties` for a RECORD on a stream without a usable SCHEMA.
    pub fn apply(&mut self, frame: Frame, transform: &Transform) -> Result<Vec<Frame>, ContractError> {
        match frame.message() {
            Message::Schema {
                stream,
                key_properties,
                ..
            } => {
                let state = self.streams.entry(stream.clone()).or_default();
                state.keys = Some(KeyProperties::Many(key_properties.clone()));
                Ok(Vec::new())
            }
            Message::Record { stream, record, .. } => {
                let stream = stream.clone();
                let Transformed { record, overrides } = transform(record.clone())?;

                let state = self.streams.entry(stream.clone()).or_default();
                let keys = state.keys.clone().ok_or_else(|| {
                    ContractError::invalid_key_properties(format!(
                        "RECORD on stream '{stream}' before any SCHEMA"
                    ))
                })?;
                state.overrides.extend(overrides);
                let tracker = state.tracker.get_or_insert_with(|| SchemaTracker::new(None));
                tracker.observe(&record);
                let schema = tracker.current(&state.overrides);

                self.framer.frame(&stream, record, schema, &keys)
            }
            Message::State { .. } => Ok(vec![frame]),
        }
    }
}
