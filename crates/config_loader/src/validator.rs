//! Configuration validation
//!
//! Rules:
//! - the tap has exactly one of `command` / `file`, and a usable key
//! - sink names are non-empty and unique
//! - command sinks carry a command, file sinks a `path` param
//! - producer and sink metrics names stay distinct after normalization
//! - histogram buckets are finite and strictly increasing

use std::collections::HashSet;

use contracts::{ContractError, PipelineBlueprint, SinkConfig, SinkType};
use observability::normalize;

/// Validate a PipelineBlueprint
///
/// Returns the first error found, or Ok(()).
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_tap(blueprint)?;
    validate_sinks(blueprint)?;
    validate_metric_names(blueprint)?;
    validate_buckets(blueprint)?;
    Ok(())
}

fn validate_tap(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let tap = &blueprint.tap;
    match (&tap.command, &tap.file) {
        (Some(_), Some(_)) => {
            return Err(ContractError::config_validation(
                "tap",
                "set either tap.command or tap.file, not both",
            ))
        }
        (None, None) => {
            return Err(ContractError::config_validation(
                "tap",
                "one of tap.command or tap.file is required",
            ))
        }
        (Some(command), None) if command.trim().is_empty() => {
            return Err(ContractError::config_validation(
                "tap.command",
                "command cannot be empty",
            ))
        }
        _ => {}
    }

    tap.key
        .fields()
        .map_err(|e| ContractError::config_validation("tap.key", e.to_string()))?;
    Ok(())
}

fn validate_sinks(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    if blueprint.sinks.is_empty() {
        return Err(ContractError::config_validation(
            "sinks",
            "at least one sink is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        match sink.sink_type {
            SinkType::Command
                if sink.command.as_deref().is_none_or(|c| c.trim().is_empty()) =>
            {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].command", sink.name),
                    "command sinks require a command",
                ));
            }
            SinkType::File if !sink.params.contains_key("path") => {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.path", sink.name),
                    "file sinks require a 'path' param",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Name a sink's metrics are keyed by
pub fn sink_metrics_name(sink: &SinkConfig) -> &str {
    match (sink.sink_type, &sink.command) {
        (SinkType::Command, Some(command)) => command,
        _ => &sink.name,
    }
}

/// Name the producer's metrics are keyed by
///
/// External producers are named by their command line; file taps by
/// `tap.name`, else the file stem.
pub fn producer_name(blueprint: &PipelineBlueprint) -> String {
    let tap = &blueprint.tap;
    if let Some(command) = &tap.command {
        return command.clone();
    }
    if let Some(name) = &tap.name {
        return name.clone();
    }
    match &tap.file {
        Some(file) => file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string()),
        None => String::new(),
    }
}

fn validate_metric_names(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::from([normalize(&producer_name(blueprint))]);
    for sink in &blueprint.sinks {
        let slug = normalize(sink_metrics_name(sink));
        if !seen.insert(slug.clone()) {
            return Err(ContractError::config_validation(
                format!("sinks[{}]", sink.name),
                format!("metrics name '{slug}' collides with another unit"),
            ));
        }
    }
    Ok(())
}

fn validate_buckets(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let buckets = &blueprint.metrics.histogram_buckets;
    if buckets.is_empty() {
        return Err(ContractError::config_validation(
            "metrics.histogram_buckets",
            "at least one bucket is required",
        ));
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(ContractError::config_validation(
            "metrics.histogram_buckets",
            "buckets must be finite",
        ));
    }
    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ContractError::config_validation(
            "metrics.histogram_buckets",
            format!("buckets must be strictly increasing, got {buckets:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_toml;

    fn blueprint(extra: &str) -> PipelineBlueprint {
        parse_toml(&format!(
            r#"
[tap]
command = "python3 dump.py"
key = "id"

[[sinks]]
name = "csv"
sink_type = "command"
command = "target-csv"
{extra}
"#
        ))
        .unwrap()
    }

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&blueprint("")).is_ok());
    }

    #[test]
    fn test_tap_needs_exactly_one_source() {
        let mut bp = blueprint("");
        bp.tap.file = Some("rows.jsonl".into());
        assert_eq!(field_of(validate(&bp).unwrap_err()), "tap");

        bp.tap.command = None;
        bp.tap.file = None;
        assert_eq!(field_of(validate(&bp).unwrap_err()), "tap");
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut bp = blueprint("");
        bp.tap.key = contracts::KeyProperties::Many(vec![]);
        assert_eq!(field_of(validate(&bp).unwrap_err()), "tap.key");
    }

    #[test]
    fn test_duplicate_sink_name() {
        let bp = blueprint(
            r#"
[[sinks]]
name = "csv"
sink_type = "log"
"#,
        );
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_sink_type_requirements() {
        let bp = blueprint(
            r#"
[[sinks]]
name = "dump"
sink_type = "file"
"#,
        );
        assert_eq!(field_of(validate(&bp).unwrap_err()), "sinks[dump].params.path");

        let mut bp = blueprint("");
        bp.sinks[0].command = Some("  ".into());
        assert_eq!(field_of(validate(&bp).unwrap_err()), "sinks[csv].command");
    }

    #[test]
    fn test_metric_name_collision() {
        // "target-csv" (command of sink "csv") and "Target CSV" share a slug
        let bp = blueprint(
            r#"
[[sinks]]
name = "Target CSV"
sink_type = "log"
"#,
        );
        assert_eq!(field_of(validate(&bp).unwrap_err()), "sinks[Target CSV]");
    }

    #[test]
    fn test_buckets_must_increase() {
        let bp = blueprint(
            r#"
[metrics]
histogram_buckets = [1.0, 1.0, 5.0]
"#,
        );
        assert_eq!(field_of(validate(&bp).unwrap_err()), "metrics.histogram_buckets");
    }

    #[test]
    fn test_producer_name_fallbacks() {
        let mut bp = blueprint("");
        bp.tap.name = Some("ignored".into());
        assert_eq!(producer_name(&bp), "python3 dump.py");
        bp.tap.name = None;
        bp.tap.command = None;
        bp.tap.file = Some("data/orders.jsonl".into());
        assert_eq!(producer_name(&bp), "orders");
        bp.tap.name = Some("Orders Feed".into());
        assert_eq!(producer_name(&bp), "Orders Feed");
    }
}
