// src/requester/dns.rs
// Resolved addresses per (host, port), shared by every requester so a
// multi-target run resolves each host once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DnsCache {
    entries: Arc<Mutex<HashMap<(String, u16), Vec<SocketAddr>>>>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Cached addresses, resolving on first use. An empty Vec means the
    // lookup failed; the request itself will then report the DNS error.
    pub async fn resolve(&self, host: &str, port: u16) -> Vec<SocketAddr> {
        let key = (host.to_string(), port);
        if let Some(addrs) = self.entries.lock().get(&key) {
            return addrs.clone();
        }

        let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                debug!(host, port, error = %e, "DNS lookup failed");
                return Vec::new();
            }
        };

        self.entries.lock().insert(key, addrs.clone());
        addrs
    }

    pub fn insert(&self, host: &str, port: u16, addrs: Vec<SocketAddr>) {
        self.entries.lock().insert((host.to_string(), port), addrs);
    }
}
