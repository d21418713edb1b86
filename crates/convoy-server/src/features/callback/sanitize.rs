//! Markup stripping for callback parameters

use regex::Regex;

/// Matches a tag, or an unclosed tag running to the end of input
const MARKUP_PATTERN: &str = r"<[^>]*>?";

#[derive(Debug, Clone)]
pub struct MarkupStripper {
    tags: Regex,
}

impl MarkupStripper {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tags: Regex::new(MARKUP_PATTERN)?,
        })
    }

    /// Remove tags and surrounding whitespace
    pub fn strip(&self, input: &str) -> String {
        self.tags.replace_all(input, "").trim().to_string()
    }
}

/// Percent-decode a query value once more; values that do not decode to UTF-8
/// are kept as received
pub fn decode_param(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        let stripper = MarkupStripper::new().unwrap();
        assert_eq!(stripper.strip("abc123"), "abc123");
        assert_eq!(stripper.strip("<b>abc</b>123"), "abc123");
        assert_eq!(stripper.strip("<script>alert(1)</script>"), "alert(1)");
        assert_eq!(stripper.strip("abc<img src=x onerror=y"), "abc");
        assert_eq!(stripper.strip("  <i></i>  "), "");
    }

    #[test]
    fn test_decode_param() {
        assert_eq!(
            decode_param("%2F%2Fhost.test%2Fprocess%2Fabc"),
            "//host.test/process/abc"
        );
        assert_eq!(decode_param("//host.test/plain"), "//host.test/plain");
        assert_eq!(decode_param("%FF"), "%FF");
    }
}
