//! Record and key-property types

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// One row of the stream: field name -> JSON value, in producer order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Primary / replication key of a stream
///
/// Either one field name or an ordered list of field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyProperties {
    /// A single key field
    Single(String),
    /// A composite key, in order
    Many(Vec<String>),
}

impl KeyProperties {
    /// Resolve to the ordered field list written in SCHEMA messages.
    ///
    /// # Errors
    /// `InvalidKeyProperties` for an empty name, an empty list, or a list
    /// containing an empty name.
    pub fn fields(&self) -> Result<Vec<String>, ContractError> {
        match self {
            Self::Single(name) if name.is_empty() => Err(ContractError::invalid_key_properties(
                "key field name must not be empty",
            )),
            Self::Single(name) => Ok(vec![name.clone()]),
            Self::Many(names) if names.is_empty() => Err(ContractError::invalid_key_properties(
                "key field list must not be empty",
            )),
            Self::Many(names) => {
                if let Some(pos) = names.iter().position(String::is_empty) {
                    return Err(ContractError::invalid_key_properties(format!(
                        "key field at position {pos} is empty"
                    )));
                }
                Ok(names.clone())
            }
        }
    }

    /// Leading key field, the one checked on every row
    pub fn primary(&self) -> Option<&str> {
        match self {
            Self::Single(name) => Some(name.as_str()),
            Self::Many(names) => names.first().map(String::as_str),
        }
    }
}

impl From<&str> for KeyProperties {
    fn from(name: &str) -> Self {
        Self::Single(name.to_string())
    }
}

impl From<String> for KeyProperties {
    fn from(name: String) -> Self {
        Self::Single(name)
    }
}

impl From<Vec<String>> for KeyProperties {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

/// Render a key value as the checkpoint string
///
/// Strings are used verbatim; other scalars use their JSON text.
pub fn checkpoint_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_key() {
        let key = KeyProperties::from("id");
        assert_eq!(key.fields().unwrap(), vec!["id".to_string()]);
        assert_eq!(key.primary(), Some("id"));
    }

    #[test]
    fn test_rejects_empty_keys() {
        assert!(KeyProperties::from("").fields().is_err());
        assert!(KeyProperties::Many(vec![]).fields().is_err());
        let err = KeyProperties::Many(vec!["a".into(), String::new()])
            .fields()
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidKeyProperties { .. }));
    }

    #[test]
    fn test_deserialize_either_shape() {
        let single: KeyProperties = serde_json::from_str(r#""id""#).unwrap();
        let many: KeyProperties = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(single, KeyProperties::from("id"));
        assert_eq!(many.fields().unwrap().len(), 2);
    }

    #[test]
    fn test_checkpoint_value() {
        assert_eq!(checkpoint_value(&serde_json::json!("2020-01-01")), "2020-01-01");
        assert_eq!(checkpoint_value(&serde_json::json!(42)), "42");
    }
}
