//! Small text helpers shared by config parsing and the remote client.

/// Longest error body kept when a remote response is echoed into an error.
const ERROR_BODY_LIMIT: usize = 180;

/// Trimmed text, or `None` when absent or blank.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToString::to_string)
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Trim a response body and cap it at [`ERROR_BODY_LIMIT`] characters.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(ERROR_BODY_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_normalizes_to_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" anon-key ".to_string())),
            Some("anon-key".to_string())
        );
    }

    #[test]
    fn only_http_schemes_count_as_urls() {
        assert!(is_http_url("http://localhost:54321"));
        assert!(is_http_url("https://project.supabase.co"));
        assert!(!is_http_url("project.supabase.co"));
        assert!(!is_http_url("postgres://db"));
    }

    #[test]
    fn error_bodies_are_capped() {
        let body = "é".repeat(400);
        assert_eq!(compact_text(&body).chars().count(), ERROR_BODY_LIMIT);
        assert_eq!(compact_text("  short  "), "short");
    }
}
