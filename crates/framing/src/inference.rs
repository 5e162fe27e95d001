//! Incremental schema inference
//!
//! Every observed row is folded into a running [`SchemaDocument`] with a
//! fixed widening lattice:
//!
//! ```text
//! null < boolean < integer < number < string
//! ```
//!
//! | current \ observed | null | scalar s | object | array |
//! |---|---|---|---|---|
//! | null    | null | s | object | array |
//! | scalar r| r | max(r, s) | string | string |
//! | object  | object | string | field-wise merge | string |
//! | array   | array | string | string | items merge |
//!
//! `string` absorbs everything. Once a field widened it never narrows again.

use std::collections::HashMap;

use contracts::{FieldSchema, FieldType, Record, SchemaDocument};
use serde_json::Value;

/// Position on the scalar chain
fn rank(field_type: FieldType) -> u8 {
    match field_type {
        FieldType::Null => 0,
        FieldType::Boolean => 1,
        FieldType::Integer => 2,
        FieldType::Number => 3,
        FieldType::String => 4,
        FieldType::Object | FieldType::Array => u8::MAX,
    }
}

/// Descriptor of a single JSON value
pub fn infer_value(value: &Value) -> FieldSchema {
    match value {
        Value::Null => FieldSchema::of(FieldType::Null),
        Value::Bool(_) => FieldSchema::of(FieldType::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldSchema::of(FieldType::Integer),
        Value::Number(_) => FieldSchema::of(FieldType::Number),
        Value::String(_) => FieldSchema::of(FieldType::String),
        Value::Object(map) => {
            let mut field = FieldSchema::of(FieldType::Object);
            for (name, nested) in map {
                merge_into(&mut field.properties, name, infer_value(nested));
            }
            field
        }
        Value::Array(items) => {
            let mut field = FieldSchema::of(FieldType::Array);
            field.items = items
                .iter()
                .map(infer_value)
                .reduce(|acc, next| widen(&acc, &next))
                .map(Box::new);
            field
        }
    }
}

/// Least common supertype of two descriptors
pub fn widen(current: &FieldSchema, observed: &FieldSchema) -> FieldSchema {
    use FieldType::*;

    match (current.field_type, observed.field_type) {
        (Null, _) => observed.clone(),
        (_, Null) => current.clone(),
        (String, _) | (_, String) => FieldSchema::of(String),
        (Object, Object) => {
            let mut merged = current.clone();
            for (name, field) in &observed.properties {
                merge_into(&mut merged.properties, name, field.clone());
            }
            merged
        }
        (Array, Array) => {
            let mut merged = FieldSchema::of(Array);
            merged.items = match (&current.items, &observed.items) {
                (Some(a), Some(b)) => Some(Box::new(widen(a, b))),
                (Some(one), None) | (None, Some(one)) => Some(one.clone()),
                (None, None) => None,
            };
            merged
        }
        (a, b) if a.is_scalar() && b.is_scalar() => {
            FieldSchema::of(if rank(a) >= rank(b) { a } else { b })
        }
        _ => FieldSchema::of(String),
    }
}

fn merge_into(
    properties: &mut std::collections::BTreeMap<String, FieldSchema>,
    name: &str,
    observed: FieldSchema,
) {
    match properties.get_mut(name) {
        Some(existing) => *existing = widen(existing, &observed),
        None => {
            properties.insert(name.to_string(), observed);
        }
    }
}

/// Running schema of one stream
#[derive(Debug, Clone, Default)]
pub struct SchemaInference {
    document: SchemaDocument,
}

impl SchemaInference {
    /// Start from an empty object schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a row's field set and types into the document
    pub fn add(&mut self, record: &Record) {
        let properties = self.document.properties_mut();
        for (name, value) in record {
            merge_into(properties, name, infer_value(value));
        }
    }

    /// Current document; stable until the next `add`
    pub fn to_schema(&self) -> SchemaDocument {
        self.document.clone()
    }

    /// Current document with caller-supplied types replacing inferred ones
    ///
    /// Only fields already present are overridden; unknown names are ignored.
    /// The running document itself is left untouched.
    pub fn to_schema_with_overrides(&self, overrides: &HashMap<String, FieldType>) -> SchemaDocument {
        let mut document = self.document.clone();
        for (name, field_type) in overrides {
            if let Some(field) = document.properties_mut().get_mut(name) {
                *field = FieldSchema::of(*field_type);
            }
        }
        document
    }

    /// Borrow the running document
    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    /// Forget everything observed so far
    pub fn reset(&mut self) {
        self.document = SchemaDocument::new();
    }
}

/// Schema source of a stream: supplied verbatim or inferred from rows
#[derive(Debug, Clone)]
pub enum SchemaTracker {
    /// Caller-supplied document; never mutated
    Explicit(Value),
    /// Inferred from observed rows
    Inferred(SchemaInference),
}

impl SchemaTracker {
    /// Tracker for `schema`, or an inferring one when `None`
    pub fn new(schema: Option<Value>) -> Self {
        match schema {
            Some(value) => Self::Explicit(value),
            None => Self::Inferred(SchemaInference::new()),
        }
    }

    /// Fold a row (no-op for explicit schemas)
    pub fn observe(&mut self, record: &Record) {
        if let Self::Inferred(inference) = self {
            inference.add(record);
        }
    }

    /// Schema to frame with, overrides applied to inferred documents only
    pub fn current(&self, overrides: &HashMap<String, FieldType>) -> Value {
        match self {
            Self::Explicit(value) => value.clone(),
            Self::Inferred(inference) if overrides.is_empty() => inference.document().to_value(),
            Self::Inferred(inference) => inference.to_schema_with_overrides(overrides).to_value(),
        }
    }

    /// Whether inference is disabled
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }
}
