//! URL normalization and validation for links.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::DocumentError;

static SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][\w+.-]*://").expect("valid scheme regex"));

static DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}(?::\d+)?(?:[/?#][^\s]*)?$",
    )
    .expect("valid domain regex")
});

/// Trim and add `https://` when no scheme is present.
///
/// Leading slashes are stripped before prefixing, so `//example.com`
/// becomes `https://example.com`.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || SCHEME.is_match(trimmed) {
        return trimmed.to_string();
    }
    format!("https://{}", trimmed.trim_start_matches('/'))
}

/// Whether `input` looks like a web address we are willing to link to.
pub fn is_url(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return false;
    }
    if !DOMAIN.is_match(trimmed) && !SCHEME.is_match(trimmed) {
        return false;
    }
    match Url::parse(&normalize_url(trimmed)) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Normalize and validate, returning the URL to store.
pub fn validate_url(input: &str) -> Result<String, DocumentError> {
    if !is_url(input) {
        return Err(DocumentError::InvalidUrl(input.trim().to_string()));
    }
    Ok(normalize_url(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_https_scheme() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  //example.com/a "), "https://example.com/a");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
    }

    #[test]
    fn accepts_web_addresses() {
        assert!(is_url("example.com"));
        assert!(is_url("www.example.com/path?q=1"));
        assert!(is_url("docs.example.co.uk"));
        assert!(is_url("https://localhost:3000/x"));
    }

    #[test]
    fn rejects_non_urls() {
        assert!(!is_url("not a url with spaces"));
        assert!(!is_url(""));
        assert!(!is_url("justtext"));
        assert!(!is_url("ftp://example.com"));
        assert!(!is_url("mailto:someone@example.com"));
    }

    #[test]
    fn validate_reports_input() {
        assert_eq!(
            validate_url("bad input"),
            Err(DocumentError::InvalidUrl("bad input".into()))
        );
        assert_eq!(validate_url("example.com").unwrap(), "https://example.com");
    }
}
