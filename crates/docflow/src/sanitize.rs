//! Helpers for sanitizing data before it enters logs and span attributes.
//!
//! Uploaded file names and paths can carry personal data, so only the final
//! name component is ever recorded, and long names are shortened.

use std::path::Path;

const MAX_NAME_CHARS: usize = 64;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(redact_name)
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Strips directory components from a client-supplied name and truncates it.
pub fn redact_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() {
        return "<unknown>".to_string();
    }
    if base.chars().count() <= MAX_NAME_CHARS {
        return base.to_string();
    }
    let truncated: String = base.chars().take(MAX_NAME_CHARS).collect();
    format!("{}…", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/Documents/referral.pdf")),
            "referral.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_name_strips_directories() {
        assert_eq!(redact_name("C:\\scans\\referral.pdf"), "referral.pdf");
        assert_eq!(redact_name("../x/y.pdf"), "y.pdf");
        assert_eq!(redact_name("  "), "<unknown>");
    }

    #[test]
    fn test_redact_name_truncates_long_names() {
        let long = "a".repeat(100);
        let redacted = redact_name(&long);
        assert_eq!(redacted.chars().count(), MAX_NAME_CHARS + 1);
        assert!(redacted.ends_with('…'));
    }
}
