// src/error.rs
// =============================================================================
// Typed errors for the two failure families the scanner cares about:
//
// - ConfigError: something is wrong with what the user asked for. These are
//   detected before any request is sent and are always fatal.
// - RequestError: a single HTTP request failed after exhausting its retries.
//   These are reported through the fuzzer's error callbacks and the scan
//   keeps going.
//
// Everything above these types (main, the controller loop) uses anyhow.
// =============================================================================

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No target URL given (use -u or -l)")]
    MissingTarget,

    #[error("No wordlist given (use -w)")]
    MissingWordlist,

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{scheme}' in '{url}' (only http and https)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("Invalid port in '{input}'")]
    InvalidPort { input: String },

    #[error("Extension '{extension}' is both included and excluded")]
    ConflictingExtension { extension: String },

    #[error("Failed to load wordlist from '{path}': {source}")]
    WordlistLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Wordlist is empty or contains no valid entries")]
    EmptyWordlist,

    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid header '{header}' (expected 'Name: value')")]
    InvalidHeader { header: String },

    #[error("Invalid credential for {scheme} auth (expected 'user:password')")]
    InvalidCredential { scheme: String },

    #[error("Invalid proxy URL '{proxy}'")]
    InvalidProxy { proxy: String },

    #[error("Invalid thread count: {value} (must be >= 1)")]
    InvalidConcurrency { value: usize },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

// The condition a request failed on, after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    Dns,
    Tls,
    Proxy,
    Connection,
    ReadBody,
    Timeout,
    TooManyRedirects,
    InvalidUrl,
    InvalidProxyUrl,
    Other,
}

impl RequestErrorKind {
    // Network conditions another attempt may clear up. The others fail the
    // same way every time unless the proxy changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RequestErrorKind::Dns
                | RequestErrorKind::Tls
                | RequestErrorKind::Proxy
                | RequestErrorKind::Connection
                | RequestErrorKind::ReadBody
                | RequestErrorKind::Timeout
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(RequestErrorKind::Timeout.is_transient());
        assert!(RequestErrorKind::Proxy.is_transient());
        assert!(!RequestErrorKind::TooManyRedirects.is_transient());
        assert!(!RequestErrorKind::InvalidUrl.is_transient());
    }

    #[test]
    fn test_request_error_displays_message_only() {
        let err = RequestError::new(RequestErrorKind::Dns, "Couldn't resolve DNS");
        assert_eq!(err.to_string(), "Couldn't resolve DNS");
    }
}
