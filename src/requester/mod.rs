// src/requester/mod.rs
// =============================================================================
// The requester: "send one request for a path, get back a Response".
//
// Submodules:
// - response: the normalized Response
// - http: the reqwest-backed implementation (retries, proxies, redirects)
// - auth: Basic/Bearer/Digest/NTLM headers
// - ntlm: NTLM message crafting
// - dns: the (host, port) -> addresses cache
// - verbatim: hyper connections for paths url::Url would normalize
// - mock: a canned-response double for tests
//
// Everything that talks to a server (scanner calibration, fuzzer workers,
// the controller's connectivity check) goes through the Requester trait, so
// tests can swap in MockRequester without touching the network.
// =============================================================================

mod auth;
mod dns;
mod http;
mod ntlm;
mod response;
mod verbatim;

#[cfg(test)]
pub mod mock;

pub use dns::DnsCache;
pub use http::HttpRequester;
pub use response::Response;

use crate::error::RequestError;
use async_trait::async_trait;

#[async_trait]
pub trait Requester: Send + Sync {
    // "scheme://host[:port]/", the prefix every request path is joined to
    fn base_url(&self) -> &str;

    // Requests base_url + path. `proxy` overrides the configured proxy pool
    // for this one request.
    async fn request(&self, path: &str, proxy: Option<&str>) -> Result<Response, RequestError>;
}
