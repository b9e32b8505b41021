// src/requester/response.rs
// =============================================================================
// The normalized response every other module works with.
//
// Whatever produced it (reqwest, or a test double), a Response carries:
// - status, headers (case-insensitive), raw body bytes
// - content: the body decoded as text, or "" when the body is binary
// - redirect: the Location header, or ""
// - history: URLs visited before this one when redirects were followed
// - path / full_path: the request path of the final URL, without the
//   leading '/' (full_path keeps the query string and fragment)
// =============================================================================

use crate::paths::{clean_path, parse_path};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, LOCATION};

#[derive(Debug, Clone)]
pub struct Response {
    pub url: String,
    pub full_path: String,
    pub path: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub content: String,
    pub redirect: String,
    pub history: Vec<String>,
    binary: bool,
}

impl Response {
    pub fn new(
        url: String,
        status: u16,
        headers: HeaderMap,
        body: Bytes,
        history: Vec<String>,
    ) -> Self {
        // A body only counts as binary when the server also declared its
        // length. Without a declared length we read it all and decode it.
        let binary = headers.contains_key(CONTENT_LENGTH) && has_binary_bytes(&body);
        let content = if binary {
            String::new()
        } else {
            String::from_utf8_lossy(&body).into_owned()
        };

        let redirect = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let full_path = parse_path(&url);
        let path = clean_path(&full_path).to_string();

        Self {
            url,
            full_path,
            path,
            status,
            headers,
            body,
            content,
            redirect,
            history,
            binary,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    // Declared content-length when there is one, otherwise what we read
    pub fn length(&self) -> usize {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.body.len())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }
}

// Two responses are "the same page" when status and body match
impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.body == other.body
    }
}

// True when the bytes contain anything outside the printable text set:
// BEL, BS, TAB, LF, FF, CR, ESC and 0x20..=0xFF except DEL.
pub fn has_binary_bytes(body: &[u8]) -> bool {
    body.iter().any(|&b| !is_text_byte(b))
}

fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 7 | 8 | 9 | 10 | 12 | 13 | 27) || (byte >= 0x20 && byte != 0x7f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_paths_from_url() {
        let response = Response::new(
            "http://example.com/admin/login.php?next=/#top".to_string(),
            200,
            HeaderMap::new(),
            Bytes::from_static(b"ok"),
            Vec::new(),
        );
        assert_eq!(response.full_path, "admin/login.php?next=/#top");
        assert_eq!(response.path, "admin/login.php");
    }

    #[test]
    fn test_binary_needs_content_length() {
        let body = Bytes::from_static(b"\x00\x01PK\x03\x04");

        let declared = Response::new(
            "http://x/a.zip".to_string(),
            200,
            headers(&[("content-length", "6")]),
            body.clone(),
            Vec::new(),
        );
        assert!(declared.is_binary());
        assert_eq!(declared.content, "");

        let streamed = Response::new(
            "http://x/a.zip".to_string(),
            200,
            HeaderMap::new(),
            body,
            Vec::new(),
        );
        assert!(!streamed.is_binary());
        assert!(streamed.content.contains("PK"));
    }

    #[test]
    fn test_text_with_control_chars_is_not_binary() {
        assert!(!has_binary_bytes(b"line\r\n\ttab\x1b[0m\x0c"));
        assert!(has_binary_bytes(b"del\x7f"));
        assert!(!has_binary_bytes("caf\u{e9}".as_bytes()));
    }

    #[test]
    fn test_redirect_and_length() {
        let response = Response::new(
            "http://x/admin".to_string(),
            301,
            headers(&[("Location", "/admin/"), ("Content-Length", "120")]),
            Bytes::new(),
            Vec::new(),
        );
        assert_eq!(response.redirect, "/admin/");
        assert_eq!(response.length(), 120);
        assert_eq!(response.header("LOCATION"), Some("/admin/"));
    }

    #[test]
    fn test_equality_is_status_and_body() {
        let a = Response::new("http://x/a".into(), 200, HeaderMap::new(), Bytes::from_static(b"same"), vec![]);
        let b = Response::new("http://x/b".into(), 200, headers(&[("x-id", "2")]), Bytes::from_static(b"same"), vec![]);
        let c = Response::new("http://x/c".into(), 403, HeaderMap::new(), Bytes::from_static(b"same"), vec![]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
