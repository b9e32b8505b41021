// src/requester/ntlm.rs
// =============================================================================
// NTLM over HTTP: the three-message handshake with NTLMv2 responses.
//
// 1. We send NEGOTIATE ("Authorization: NTLM <type 1>")
// 2. The server answers 401 with CHALLENGE ("WWW-Authenticate: NTLM <type 2>")
// 3. We answer with AUTHENTICATE (type 3), computed from the challenge
//
// NTLMv2 needs MD4 (for the NT hash) and HMAC-MD5, both from the RustCrypto
// hashes.
// =============================================================================

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use std::time::{SystemTime, UNIX_EPOCH};

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;

const NEGOTIATE_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_OEM
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY;

// Seconds between 1601-01-01 (Windows FILETIME epoch) and 1970-01-01
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlmCredentials {
    pub domain: String,
    pub username: String,
    pub password: String,
}

impl NtlmCredentials {
    // "DOMAIN\user:password" or "user:password"
    pub fn parse(credential: &str) -> Option<Self> {
        let (user, password) = credential.split_once(':')?;
        let (domain, username) = match user.split_once('\\') {
            Some((domain, username)) => (domain, username),
            None => ("", user),
        };
        Some(Self {
            domain: domain.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

// Type 1, base64 encoded, ready for the Authorization header
pub fn negotiate_message() -> String {
    let mut message = Vec::with_capacity(32);
    message.extend_from_slice(SIGNATURE);
    message.extend_from_slice(&1u32.to_le_bytes());
    message.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    // empty domain and workstation buffers
    message.extend_from_slice(&[0u8; 16]);
    STANDARD.encode(message)
}

// Parses the base64 payload of a "WWW-Authenticate: NTLM ..." header
pub fn parse_challenge(encoded: &str) -> Option<Challenge> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    if bytes.len() < 32 || &bytes[..8] != SIGNATURE || read_u32(&bytes, 8)? != 2 {
        return None;
    }

    let flags = read_u32(&bytes, 20)?;
    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&bytes[24..32]);

    let target_info = if bytes.len() >= 48 {
        let length = read_u16(&bytes, 40)? as usize;
        let offset = read_u32(&bytes, 44)? as usize;
        bytes.get(offset..offset + length)?.to_vec()
    } else {
        Vec::new()
    };

    Some(Challenge {
        flags,
        server_challenge,
        target_info,
    })
}

// Type 3, base64 encoded
pub fn authenticate_message(credentials: &NtlmCredentials, challenge: &Challenge) -> String {
    let client_challenge: [u8; 8] = rand::random();
    let timestamp = filetime_now();
    authenticate_message_with(credentials, challenge, client_challenge, timestamp)
}

fn authenticate_message_with(
    credentials: &NtlmCredentials,
    challenge: &Challenge,
    client_challenge: [u8; 8],
    timestamp: u64,
) -> String {
    let key = ntowf_v2(&credentials.username, &credentials.domain, &credentials.password);

    // NTLMv2 client blob
    let mut blob = Vec::new();
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0u8; 4]);

    let mut proof_input = challenge.server_challenge.to_vec();
    proof_input.extend_from_slice(&blob);
    let mut nt_response = hmac_md5(&key, &proof_input).to_vec();
    nt_response.extend_from_slice(&blob);

    let mut lm_input = challenge.server_challenge.to_vec();
    lm_input.extend_from_slice(&client_challenge);
    let mut lm_response = hmac_md5(&key, &lm_input).to_vec();
    lm_response.extend_from_slice(&client_challenge);

    let domain = utf16le(&credentials.domain);
    let user = utf16le(&credentials.username);
    let workstation: Vec<u8> = Vec::new();

    let flags = (challenge.flags & NEGOTIATE_FLAGS) | NEGOTIATE_UNICODE | NEGOTIATE_NTLM;

    // 64 byte header followed by the payload, buffers in this order
    let payloads = [&lm_response, &nt_response, &domain, &user, &workstation];
    let mut offsets = Vec::with_capacity(payloads.len());
    let mut offset = 64u32;
    for payload in payloads {
        offsets.push(offset);
        offset += payload.len() as u32;
    }

    let mut message = Vec::with_capacity(offset as usize);
    message.extend_from_slice(SIGNATURE);
    message.extend_from_slice(&3u32.to_le_bytes());
    for (payload, offset) in payloads.iter().zip(&offsets) {
        push_security_buffer(&mut message, payload.len(), *offset);
    }
    // no session key
    push_security_buffer(&mut message, 0, offset);
    message.extend_from_slice(&flags.to_le_bytes());
    for payload in payloads {
        message.extend_from_slice(payload);
    }

    STANDARD.encode(message)
}

fn push_security_buffer(message: &mut Vec<u8>, length: usize, offset: u32) {
    let length = length as u16;
    message.extend_from_slice(&length.to_le_bytes());
    message.extend_from_slice(&length.to_le_bytes());
    message.extend_from_slice(&offset.to_le_bytes());
}

fn ntowf_v2(username: &str, domain: &str, password: &str) -> [u8; 16] {
    let nt_hash = md4(&utf16le(password));
    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(&nt_hash, &identity)
}

fn filetime_now() -> u64 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    (unix + FILETIME_EPOCH_OFFSET) * 10_000_000
}

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let slice = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

type HmacMd5 = Hmac<Md5>;

pub fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut digest = [0u8; 16];
    // HMAC takes keys of any length, new_from_slice only fails for fixed-key MACs
    if let Ok(mut mac) = HmacMd5::new_from_slice(key) {
        mac.update(data);
        digest.copy_from_slice(&mac.finalize().into_bytes());
    }
    digest
}

pub fn md4(input: &[u8]) -> [u8; 16] {
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&Md4::digest(input));
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_md4_vectors() {
        assert_eq!(hex(&md4(b"")), "31d6cfe0d16ae931b73c59d7e0c089c0");
        assert_eq!(hex(&md4(b"abc")), "a448017aaf21d8525fc10ae87aa6729d");
        assert_eq!(
            hex(&md4(b"12345678901234567890123456789012345678901234567890123456789012345678901234567890")),
            "e33b4ddc9c38f2199c3e7b164fcc0536"
        );
    }

    #[test]
    fn test_nt_hash() {
        assert_eq!(hex(&md4(&utf16le("password"))), "8846f7eaee8fb117ad06bdd830b7586c");
    }

    #[test]
    fn test_hmac_md5_rfc2104() {
        let key = [0x0bu8; 16];
        assert_eq!(hex(&hmac_md5(&key, b"Hi There")), "9294727a3638bb1c13f48ef8158bfc9d");
    }

    #[test]
    fn test_ntowf_v2_reference_value() {
        assert_eq!(
            hex(&ntowf_v2("User", "Domain", "Password")),
            "0c868a403bfd7a93a3001ef22ef02e3f"
        );
    }

    #[test]
    fn test_credentials_with_domain() {
        let creds = NtlmCredentials::parse("CORP\\alice:s3cr:et").unwrap();
        assert_eq!(creds.domain, "CORP");
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3cr:et");
        assert!(NtlmCredentials::parse("nopassword").is_none());
    }

    #[test]
    fn test_negotiate_message_layout() {
        let raw = STANDARD.decode(negotiate_message()).unwrap();
        assert_eq!(raw.len(), 32);
        assert_eq!(&raw[..8], SIGNATURE);
        assert_eq!(read_u32(&raw, 8), Some(1));
    }

    #[test]
    fn test_challenge_roundtrip_into_authenticate() {
        let target_info = vec![0x02, 0x00, 0x04, 0x00, b'D', 0, b'M', 0, 0, 0, 0, 0];
        let mut challenge = Vec::new();
        challenge.extend_from_slice(SIGNATURE);
        challenge.extend_from_slice(&2u32.to_le_bytes());
        challenge.extend_from_slice(&[0u8; 8]); // target name
        challenge.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
        challenge.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        challenge.extend_from_slice(&[0u8; 8]); // reserved
        challenge.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        challenge.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        challenge.extend_from_slice(&48u32.to_le_bytes());
        challenge.extend_from_slice(&target_info);

        let parsed = parse_challenge(&STANDARD.encode(&challenge)).unwrap();
        assert_eq!(parsed.server_challenge, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(parsed.target_info, target_info);

        let creds = NtlmCredentials::parse("DM\\bob:pw").unwrap();
        let message = authenticate_message_with(&creds, &parsed, [9; 8], 0);
        let raw = STANDARD.decode(message).unwrap();
        assert_eq!(&raw[..8], SIGNATURE);
        assert_eq!(read_u32(&raw, 8), Some(3));
        // LM response is always 24 bytes and starts right after the header
        assert_eq!(read_u16(&raw, 12), Some(24));
        assert_eq!(read_u32(&raw, 16), Some(64));
        // user name is UTF-16LE "bob"
        let user_len = read_u16(&raw, 36).unwrap() as usize;
        let user_offset = read_u32(&raw, 40).unwrap() as usize;
        assert_eq!(&raw[user_offset..user_offset + user_len], &utf16le("bob")[..]);
    }

    #[test]
    fn test_rejects_non_challenge() {
        assert!(parse_challenge(&negotiate_message()).is_none());
        assert!(parse_challenge("not base64!").is_none());
    }
}
