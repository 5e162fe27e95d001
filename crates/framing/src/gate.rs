//! Schema inspection for the null-schema validation gate

use serde_json::Value;

/// Fields (dotted paths for nested objects) whose only type is `null`
///
/// Accepts both `"type": "null"` and `"type": ["null"]`.
pub fn null_typed_fields(schema: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect(schema, "", &mut found);
    found
}

fn collect(schema: &Value, prefix: &str, found: &mut Vec<String>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, field) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        if is_null_only(field.get("type")) {
            found.push(path);
        } else {
            collect(field, &path, found);
        }
    }
}

fn is_null_only(field_type: Option<&Value>) -> bool {
    match field_type {
        Some(Value::String(t)) => t == "null",
        Some(Value::Array(types)) => !types.is_empty() && types.iter().all(|t| t == "null"),
        _ => false,
    }
}
