/// Helper utilities shared across the CLI

/// Interpret a label value as a boolean flag.
///
/// Accepts the forms docker-compose users actually write: "true", "True",
/// "TRUE", "1". Anything else, including an absent label, means disabled.
pub fn is_true(value: Option<&str>) -> bool {
    match value {
        Some(v) => v.eq_ignore_ascii_case("true") || v == "1",
        None => false,
    }
}

/// Remove exactly one leading path separator.
///
/// Used when re-rooting a container destination path under a prefix so the
/// joined path does not escape back to the filesystem root.
pub fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_true() {
        assert!(is_true(Some("true")));
        assert!(is_true(Some("True")));
        assert!(is_true(Some("1")));
        assert!(!is_true(Some("false")));
        assert!(!is_true(Some("")));
        assert!(!is_true(Some("yes")));
        assert!(!is_true(None));
    }

    #[test]
    fn test_strip_leading_slash() {
        assert_eq!(strip_leading_slash("/var/lib/mysql"), "var/lib/mysql");
        assert_eq!(strip_leading_slash("relative/path"), "relative/path");
        // Only one separator is removed
        assert_eq!(strip_leading_slash("//double"), "/double");
    }
}
