//! Utility functions for feed processing.

/// Helper function to validate a URL
pub fn is_valid_url(url: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(url) {
        parsed.scheme() == "http" || parsed.scheme() == "https"
    } else {
        false
    }
}

/// Extracts the `charset=` parameter of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find(|part| part.to_lowercase().starts_with("charset="))
        .and_then(|part| part.split_once('='))
        .map(|(_, charset)| charset.trim().trim_matches('"').to_lowercase())
        .filter(|charset| !charset.is_empty())
}

/// Decodes a body using the announced charset, falling back to lossy UTF-8.
pub fn decode_body(bytes: &[u8], charset: Option<&str>) -> String {
    if let Some(encoding) = charset.and_then(|c| encoding_rs::Encoding::for_label(c.trim().as_bytes())) {
        let (decoded, _, _) = encoding.decode(bytes);
        return decoded.into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Clean up malformed XML
pub fn cleanup_xml(xml: &str) -> String {
    let mut cleaned = xml.trim().trim_start_matches('\u{FEFF}').to_string();

    // Remove any leading whitespace or invalid characters before <?xml or <rss
    if let Some(xml_start) = cleaned.find("<?xml") {
        cleaned = cleaned[xml_start..].to_string();
    } else if let Some(rss_start) = cleaned.find("<rss") {
        cleaned = cleaned[rss_start..].to_string();
    } else if let Some(feed_start) = cleaned.find("<feed") {
        cleaned = cleaned[feed_start..].to_string();
    }

    // The result is a Rust string, so any declared encoding no longer applies
    if cleaned.starts_with("<?xml") {
        if let Some(end) = cleaned.find("?>") {
            cleaned = cleaned[end + 2..].trim_start().to_string();
        }
    }

    // HTML named entities are not defined in XML
    cleaned = cleaned
        .replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&rsquo;", "&#8217;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rdquo;", "&#8221;")
        .replace("&ldquo;", "&#8220;")
        .replace("&hellip;", "&#8230;")
        .replace("&amp;amp;", "&amp;");

    // Remove any invalid XML characters
    cleaned = cleaned
        .chars()
        .filter(|&c| {
            matches!(c,
                '\u{0009}' | // tab
                '\u{000A}' | // newline
                '\u{000D}' | // carriage return
                '\u{0020}'..='\u{D7FF}' |
                '\u{E000}'..='\u{FFFD}' |
                '\u{10000}'..='\u{10FFFF}'
            )
        })
        .collect();

    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://example.com/feed.xml"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com/feed.xml"));
        assert!(!is_valid_url("feed.xml"));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("application/rss+xml; charset=\"Windows-1251\""),
            Some("windows-1251".to_string())
        );
        assert_eq!(charset_from_content_type("text/html;charset=utf-8"), Some("utf-8".to_string()));
        assert_eq!(charset_from_content_type("text/xml"), None);
    }

    #[test]
    fn test_decode_body_with_charset() {
        // "Привет" in windows-1251
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(decode_body(&bytes, Some("windows-1251")), "Привет");
        assert_eq!(decode_body("plain".as_bytes(), None), "plain");
        assert_eq!(decode_body("plain".as_bytes(), Some("no-such-charset")), "plain");
    }

    #[test]
    fn test_cleanup_xml_replaces_declared_encoding() {
        let cleaned = cleanup_xml("<?xml version=\"1.0\" encoding=\"windows-1251\"?>\n<rss></rss>");
        assert_eq!(cleaned, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss></rss>");
    }

    #[test]
    fn test_cleanup_xml() {
        let cleaned = cleanup_xml("\u{FEFF}  junk<rss version=\"2.0\"><title>a&nbsp;b\u{0001}</title></rss>");
        assert!(cleaned.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss"));
        assert!(cleaned.contains("a&#160;b</title>"));
        assert!(!cleaned.contains('\u{0001}'));
    }
}
