// src/paths.rs
// =============================================================================
// Small string helpers for URL paths, shared by the dictionary, the scanner
// and the controller.
//
// These work on plain strings on purpose: url::Url normalizes paths
// (collapses "..", re-encodes characters), and a wordlist entry has to reach
// the server exactly the way it was written.
// =============================================================================

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

// Escaped when quoting a wordlist entry: everything except ASCII letters,
// digits, "_.-~" and the reserved characters below. '%' is kept, so entries
// that are already escaped pass through.
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'!')
    .remove(b'"')
    .remove(b'#')
    .remove(b'$')
    .remove(b'%')
    .remove(b'&')
    .remove(b'+')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'<')
    .remove(b'=')
    .remove(b'>')
    .remove(b'?')
    .remove(b'@')
    .remove(b'[')
    .remove(b'\\')
    .remove(b']')
    .remove(b'^')
    .remove(b'`')
    .remove(b'{')
    .remove(b'|')
    .remove(b'}');

pub fn safe_quote(input: &str) -> String {
    utf8_percent_encode(input, QUOTE_SET).to_string()
}

// Decodes %XX sequences. Invalid sequences are kept as they are and
// invalid UTF-8 is replaced, like a browser address bar would.
pub fn unquote(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

// Drops the query string and the fragment
pub fn clean_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

// Extracts the path (with query and fragment, without the leading '/')
// from an absolute URL. Anything that isn't an absolute URL is treated
// as a path already.
pub fn parse_path(value: &str) -> String {
    if let Some((scheme, rest)) = value.split_once("//") {
        if scheme.is_empty() || scheme.ends_with(':') {
            return match rest.find('/') {
                Some(index) => rest[index + 1..].to_string(),
                None => String::new(),
            };
        }
    }
    value.strip_prefix('/').unwrap_or(value).to_string()
}

// Formats a byte count the way result lines show it: 0B, 512B, 4KB, 12MB
pub fn human_size(bytes: usize) -> String {
    let mut num = bytes as u64;
    for unit in ["B", "KB", "MB", "GB"] {
        if num < 1024 {
            return format!("{}{}", num, unit);
        }
        num = (num + 512) / 1024;
    }
    format!("{}TB", num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_quote_keeps_reserved_characters() {
        assert_eq!(safe_quote("admin/../etc?x=1#top"), "admin/../etc?x=1#top");
        assert_eq!(safe_quote("%2e%2e/"), "%2e%2e/");
        assert_eq!(safe_quote("[a]{b}|c^d`e\\f"), "[a]{b}|c^d`e\\f");
    }

    #[test]
    fn test_safe_quote_escapes_the_rest() {
        assert_eq!(safe_quote("my file"), "my%20file");
        assert_eq!(safe_quote("it's(1)*,"), "it%27s%281%29%2A%2C");
        assert_eq!(safe_quote("café"), "caf%C3%A9");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("my%20file"), "my file");
        assert_eq!(unquote("caf%C3%A9"), "café");
        assert_eq!(unquote("100%"), "100%");
        assert_eq!(unquote("%zz"), "%zz");
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("admin/?id=1"), "admin/");
        assert_eq!(clean_path("index.php#top"), "index.php");
        assert_eq!(clean_path("plain"), "plain");
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("http://example.com/a/b?c=1"), "a/b?c=1");
        assert_eq!(parse_path("https://example.com"), "");
        assert_eq!(parse_path("//cdn.example.com/x"), "x");
        assert_eq!(parse_path("/admin/"), "admin/");
        assert_eq!(parse_path("admin/"), "admin/");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(1023), "1023B");
        assert_eq!(human_size(4096), "4KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5MB");
    }
}
