//! Protocol messages
//!
//! One JSON object per line, tagged by `"type"`:
//!
//! ```text
//! {"type":"SCHEMA","stream":"s","schema":{...},"key_properties":["id"],"bookmark_properties":null}
//! {"type":"RECORD","stream":"s","record":{...},"time_extracted":null}
//! {"type":"STATE","value":{...}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Record;

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    /// Describes the records that follow on the same stream
    Schema {
        stream: String,
        schema: serde_json::Value,
        key_properties: Vec<String>,
        #[serde(default)]
        bookmark_properties: Option<Vec<String>>,
    },
    /// One data row
    Record {
        stream: String,
        record: Record,
        #[serde(default)]
        time_extracted: Option<DateTime<Utc>>,
    },
    /// Opaque producer state, forwarded untouched
    State { value: serde_json::Value },
}

impl Message {
    /// Stream the message belongs to (`None` for STATE)
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::Schema { stream, .. } | Self::Record { stream, .. } => Some(stream),
            Self::State { .. } => None,
        }
    }

    /// Whether this is a RECORD message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Tag as written on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SCHEMA",
            Self::Record { .. } => "RECORD",
            Self::State { .. } => "STATE",
        }
    }
}
