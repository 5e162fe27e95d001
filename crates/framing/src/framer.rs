//! Message framing
//!
//! Turns rows into SCHEMA + RECORD line pairs and parses lines back into
//! [`Message`]s. Every line is newline-terminated.

use std::collections::HashMap;

use chrono::Utc;
use contracts::{ContractError, KeyProperties, Message, Record, SchemaEmission};
use serde_json::Value;
use tracing::error;

/// One encoded message together with its wire line
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    message: Message,
    line: String,
}

impl Frame {
    /// Encode a message into a newline-terminated line
    pub fn encode(message: Message) -> Result<Self, ContractError> {
        let mut line = serde_json::to_string(&message).map_err(ContractError::ProtocolEncode)?;
        line.push('\n');
        Ok(Self { message, line })
    }

    /// Parse a wire line, keeping the original text
    pub fn decode(line: &str) -> Result<Self, ContractError> {
        let message = parse(line)?;
        let mut line = line.trim_end_matches(['\r', '\n']).to_string();
        line.push('\n');
        Ok(Self { message, line })
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Newline-terminated wire text
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Wire size in bytes
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    pub fn into_line(self) -> String {
        self.line
    }
}

/// SCHEMA line followed by the RECORD line it describes
#[derive(Debug, Clone, PartialEq)]
pub struct FramedPair {
    pub schema: Frame,
    pub record: Frame,
}

impl FramedPair {
    /// Both frames, schema first
    pub fn into_frames(self) -> Vec<Frame> {
        vec![self.schema, self.record]
    }
}

/// Frame one row with the schema in effect for it
///
/// # Errors
/// `InvalidKeyProperties` when `key` is empty.
pub fn frame(
    stream: &str,
    record: Record,
    schema: Value,
    key: &KeyProperties,
) -> Result<FramedPair, ContractError> {
    frame_at(stream, record, schema, key, None)
}

/// [`frame`] with an explicit `time_extracted`
pub fn frame_at(
    stream: &str,
    record: Record,
    schema: Value,
    key: &KeyProperties,
    time_extracted: Option<chrono::DateTime<Utc>>,
) -> Result<FramedPair, ContractError> {
    let key_properties = key.fields()?;
    let schema = Frame::encode(Message::Schema {
        stream: stream.to_string(),
        schema,
        key_properties,
        bookmark_properties: None,
    })?;
    let record = Frame::encode(Message::Record {
        stream: stream.to_string(),
        record,
        time_extracted,
    })?;
    Ok(FramedPair { schema, record })
}

/// Decode one protocol line
///
/// Malformed lines are logged verbatim before the error is returned; they are
/// never skipped.
pub fn parse(line: &str) -> Result<Message, ContractError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    serde_json::from_str(trimmed).map_err(|e| {
        error!(line = %trimmed, error = %e, "Malformed protocol line");
        ContractError::protocol_decode(trimmed, e)
    })
}

/// Stateful framer applying a [`SchemaEmission`] policy per stream
#[derive(Debug, Default)]
pub struct Framer {
    emission: SchemaEmission,
    stamp_time_extracted: bool,
    last_sent: HashMap<String, (Value, Vec<String>)>,
}

impl Framer {
    pub fn new(emission: SchemaEmission) -> Self {
        Self {
            emission,
            ..Self::default()
        }
    }

    /// Fill `time_extracted` with the framing instant
    pub fn with_time_extracted(mut self, enabled: bool) -> Self {
        self.stamp_time_extracted = enabled;
        self
    }

    pub fn emission(&self) -> SchemaEmission {
        self.emission
    }

    /// Frame a row; the SCHEMA frame is omitted under `OnChange` when the
    /// stream's schema and keys equal the last ones sent
    pub fn frame(
        &mut self,
        stream: &str,
        record: Record,
        schema: Value,
        key: &KeyProperties,
    ) -> Result<Vec<Frame>, ContractError> {
        let time_extracted = self.stamp_time_extracted.then(Utc::now);
        let keys = key.fields()?;
        let unchanged = self
            .last_sent
            .get(stream)
            .is_some_and(|(sent, sent_keys)| *sent == schema && *sent_keys == keys);

        if self.emission == SchemaEmission::OnChange && unchanged {
            let record = Frame::encode(Message::Record {
                stream: stream.to_string(),
                record,
                time_extracted,
            })?;
            return Ok(vec![record]);
        }

        self.last_sent
            .insert(stream.to_string(), (schema.clone(), keys));
        Ok(frame_at(stream, record, schema, key, time_extracted)?.into_frames())
    }
}
