// src/requester/auth.rs
// =============================================================================
// Authorization headers.
//
// Two moments matter:
// - preemptive_header(): sent with every first attempt. Basic and Bearer are
//   complete here; NTLM sends its NEGOTIATE message.
// - challenge_response(): the server answered 401 with WWW-Authenticate.
//   Digest and NTLM compute their answer from that challenge and the
//   request is sent once more.
// =============================================================================

use super::ntlm::{self, NtlmCredentials};
use crate::config::{AuthConfig, AuthScheme};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct Authenticator {
    scheme: AuthScheme,
    credential: String,
    /// Digest nonce count, shared by all requests
    nonce_count: AtomicU32,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            scheme: config.scheme,
            credential: config.credential.clone(),
            nonce_count: AtomicU32::new(0),
        }
    }

    pub fn preemptive_header(&self) -> Option<String> {
        match self.scheme {
            AuthScheme::Basic => Some(format!("Basic {}", STANDARD.encode(&self.credential))),
            AuthScheme::Bearer => Some(format!("Bearer {}", self.credential)),
            AuthScheme::Ntlm => Some(format!("NTLM {}", ntlm::negotiate_message())),
            AuthScheme::Digest => None,
        }
    }

    // `challenge` is the raw WWW-Authenticate value, `uri` the request-target
    // ("/path?query") that the digest is computed over.
    pub fn challenge_response(&self, method: &str, uri: &str, challenge: &str) -> Option<String> {
        match self.scheme {
            AuthScheme::Digest => {
                let params = strip_scheme(challenge, "digest")?;
                self.digest_header(method, uri, &parse_challenge_params(params))
            }
            AuthScheme::Ntlm => {
                let payload = strip_scheme(challenge, "ntlm")?;
                let challenge = ntlm::parse_challenge(payload)?;
                let credentials = NtlmCredentials::parse(&self.credential)?;
                Some(format!(
                    "NTLM {}",
                    ntlm::authenticate_message(&credentials, &challenge)
                ))
            }
            AuthScheme::Basic | AuthScheme::Bearer => None,
        }
    }

    fn digest_header(
        &self,
        method: &str,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> Option<String> {
        let (username, password) = self.credential.split_once(':')?;
        let realm = params.get("realm").map(String::as_str).unwrap_or("");
        let nonce = params.get("nonce")?;

        let algorithm = params
            .get("algorithm")
            .map(String::as_str)
            .unwrap_or("MD5");
        if !algorithm.eq_ignore_ascii_case("md5") && !algorithm.eq_ignore_ascii_case("md5-sess") {
            return None;
        }

        let qop_auth = params
            .get("qop")
            .map(|qop| qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")))
            .unwrap_or(false);

        let nc = format!("{:08x}", self.nonce_count.fetch_add(1, Ordering::Relaxed) + 1);
        let cnonce = format!("{:016x}", rand::random::<u64>());

        let mut ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
        if algorithm.eq_ignore_ascii_case("md5-sess") {
            ha1 = md5_hex(&format!("{}:{}:{}", ha1, nonce, cnonce));
        }
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let response = if qop_auth {
            md5_hex(&format!("{}:{}:{}:{}:auth:{}", ha1, nonce, nc, cnonce, ha2))
        } else {
            md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            username, realm, nonce, uri, response
        );
        if let Some(opaque) = params.get("opaque") {
            header.push_str(&format!(", opaque=\"{}\"", opaque));
        }
        if params.contains_key("algorithm") {
            header.push_str(&format!(", algorithm={}", algorithm));
        }
        if qop_auth {
            header.push_str(&format!(", qop=auth, nc={}, cnonce=\"{}\"", nc, cnonce));
        }
        Some(header)
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

// "Digest realm=..." -> "realm=...", None if the scheme doesn't match
fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let header = header.trim();
    let (name, rest) = header.split_once(' ').unwrap_or((header, ""));
    name.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

// key=value pairs separated by commas; values may be quoted and quoted
// values may contain commas.
fn parse_challenge_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }
        params.insert(key, value.trim().to_string());
    }

    params
}
