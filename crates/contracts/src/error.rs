//! Layered error definitions
//!
//! Categorized by source: row / framing / validation gate / sink / producer / config

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Row Errors =====
    /// The producer returned something that is not a JSON object
    #[error("invalid row from '{stream}': expected an object, got {found}")]
    InvalidRow { stream: String, found: String },

    /// The configured key field is absent from a row
    #[error("key field '{key}' missing from row of '{stream}'")]
    MissingKey { stream: String, key: String },

    // ===== Framing Errors =====
    /// Key properties are neither a field name nor a non-empty list of names
    #[error("invalid key properties: {message}")]
    InvalidKeyProperties { message: String },

    /// A protocol line is not valid JSON or not a known message
    #[error("protocol decode error on line {line:?}: {source}")]
    ProtocolDecode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// A message could not be encoded
    #[error("protocol encode error: {0}")]
    ProtocolEncode(#[source] serde_json::Error),

    // ===== Validation Gate =====
    /// A schema carries fields whose only inferred type is `null`
    #[error("schema for '{stream}' has null-typed fields: {fields:?}")]
    NullSchemaField { stream: String, fields: Vec<String> },

    // ===== Sink Errors =====
    /// A subprocess reported an unhandled failure on stderr
    #[error("process '{process}' crashed ({signature}): {excerpt}")]
    SinkCrash {
        process: String,
        signature: String,
        excerpt: String,
    },

    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== Producer Errors =====
    /// Upstream failure worth retrying (rate limiting, 5xx, timeouts)
    #[error("transient producer error: {message}")]
    TransientProducer { message: String },

    /// Retries of a transient failure were exhausted
    #[error("producer gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Checkpoint backend error
    #[error("checkpoint error: {message}")]
    Checkpoint { message: String },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create invalid row error, describing the JSON kind that was found
    pub fn invalid_row(stream: impl Into<String>, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::InvalidRow {
            stream: stream.into(),
            found: found.to_string(),
        }
    }

    /// Create missing key error
    pub fn missing_key(stream: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            stream: stream.into(),
            key: key.into(),
        }
    }

    /// Create invalid key properties error
    pub fn invalid_key_properties(message: impl Into<String>) -> Self {
        Self::InvalidKeyProperties {
            message: message.into(),
        }
    }

    /// Create protocol decode error for the offending line
    pub fn protocol_decode(line: impl Into<String>, source: serde_json::Error) -> Self {
        Self::ProtocolDecode {
            line: line.into(),
            source,
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create transient producer error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientProducer {
            message: message.into(),
        }
    }

    /// Create checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProducer { .. })
    }
}
