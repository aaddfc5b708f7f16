//! Link extraction from free-form chat text

use regex::Regex;
use std::sync::LazyLock;

/// `http`/`https` followed by anything that is not whitespace, an angle bracket,
/// a quote or one of the characters chat clients use to wrap links.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("URL pattern compiles")
});

/// Return the first web URL in `text`, in document order.
///
/// No reachability or syntax validation beyond the pattern is performed.
pub fn extract_url(text: &str) -> Option<&str> {
    URL_PATTERN.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_url_in_sentence() {
        assert_eq!(
            extract_url("check this out http://example.com/v"),
            Some("http://example.com/v")
        );
    }

    #[test]
    fn test_returns_first_of_many() {
        let text = "a https://first.example/x then http://second.example/y";
        assert_eq!(extract_url(text), Some("https://first.example/x"));
    }

    #[test]
    fn test_no_url() {
        assert_eq!(extract_url("no links here"), None);
        assert_eq!(extract_url(""), None);
        assert_eq!(extract_url("ftp://files.example/a"), None);
        // Scheme with nothing after it is not a URL
        assert_eq!(extract_url("http:// spaced"), None);
    }

    #[test]
    fn test_stops_at_delimiters() {
        assert_eq!(
            extract_url("<https://example.com/watch?v=abc>"),
            Some("https://example.com/watch?v=abc")
        );
        assert_eq!(
            extract_url(r#"href="https://example.com/a" rest"#),
            Some("https://example.com/a")
        );
        assert_eq!(
            extract_url("[link](https://example.com/b)"),
            Some("https://example.com/b)")
        );
        assert_eq!(
            extract_url("https://example.com/c\nnext line"),
            Some("https://example.com/c")
        );
    }

    #[test]
    fn test_keeps_query_and_fragment() {
        assert_eq!(
            extract_url("https://video.example/watch?v=1&t=30s#frag"),
            Some("https://video.example/watch?v=1&t=30s#frag")
        );
    }
}
