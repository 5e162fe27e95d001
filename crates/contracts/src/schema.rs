//! Schema document model
//!
//! A JSON-Schema shaped description of a stream:
//! `{"type":"object","properties":{"id":{"type":"integer"}}}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
}

impl FieldType {
    /// Name as written in the schema document
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether values of this type are scalars on the widening chain
    pub fn is_scalar(self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type descriptor of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Nested fields, only for `object`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldSchema>,

    /// Element type, only for a non-empty `array`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,
}

impl FieldSchema {
    /// Descriptor with no nested structure
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            properties: BTreeMap::new(),
            items: None,
        }
    }
}

fn object_kind() -> FieldType {
    FieldType::Object
}

/// Top-level schema of a stream, always an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(rename = "type", default = "object_kind")]
    kind: FieldType,

    #[serde(default)]
    properties: BTreeMap<String, FieldSchema>,
}

impl Default for SchemaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaDocument {
    /// Empty object schema
    pub fn new() -> Self {
        Self {
            kind: FieldType::Object,
            properties: BTreeMap::new(),
        }
    }

    /// All fields, sorted by name
    pub fn properties(&self) -> &BTreeMap<String, FieldSchema> {
        &self.properties
    }

    /// Mutable access for the inference engine
    pub fn properties_mut(&mut self) -> &mut BTreeMap<String, FieldSchema> {
        &mut self.properties
    }

    /// Descriptor of one field
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.properties.get(name)
    }

    /// Whether a field is present
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether no field was observed yet
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// JSON form carried inside SCHEMA messages
    pub fn to_value(&self) -> serde_json::Value {
        let properties = self
            .properties
            .iter()
            .map(|(name, field)| (name.clone(), field_to_value(field)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::json!({ "type": "object", "properties": properties })
    }
}

fn field_to_value(field: &FieldSchema) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    out.insert("type".into(), field.field_type.as_str().into());
    if !field.properties.is_empty() {
        let nested = field
            .properties
            .iter()
            .map(|(name, f)| (name.clone(), field_to_value(f)))
            .collect::<serde_json::Map<_, _>>();
        out.insert("properties".into(), nested.into());
    }
    if let Some(items) = &field.items {
        out.insert("items".into(), field_to_value(items));
    }
    out.into()
}
