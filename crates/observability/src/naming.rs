//! Metrics-key normalization

/// Turn a command line or type name into a metrics-safe slug
///
/// Lowercases, collapses whitespace runs to one space, trims, then maps
/// spaces, hyphens and dots to underscores.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace([' ', '-', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_command_line() {
        assert_eq!(normalize("python3   dump_text.py"), "python3_dump_text_py");
        assert_eq!(normalize("  Tap-Fixerio  "), "tap_fixerio");
    }

    #[test]
    fn test_normalize_collapses_mixed_whitespace() {
        assert_eq!(normalize("Target\t\tBigQuery\n v1.2"), "target_bigquery_v1_2");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("My Source.Name");
        assert_eq!(normalize(&once), once);
    }
}
