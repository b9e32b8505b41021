// src/requester/mock.rs
// A Requester that answers from a closure instead of the network, and
// remembers every path it was asked for. Test-only.

use super::{Requester, Response};
use crate::error::RequestError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

pub type Route = dyn Fn(&str) -> Result<MockReply, RequestError> + Send + Sync;

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl MockReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

pub struct MockRequester {
    base_url: String,
    route: Box<Route>,
    latency: Duration,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockRequester {
    pub fn new(
        base_url: &str,
        route: impl Fn(&str) -> Result<MockReply, RequestError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            base_url: base_url.to_string(),
            route: Box::new(route),
            latency: Duration::ZERO,
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requested.lock().len()
    }
}

#[async_trait]
impl Requester for MockRequester {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, path: &str, _proxy: Option<&str>) -> Result<Response, RequestError> {
        self.requested.lock().push(path.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = (self.route)(path)?;
        let mut headers = HeaderMap::new();
        for (name, value) in &reply.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        Ok(Response::new(
            format!("{}{}", self.base_url, path),
            reply.status,
            headers,
            Bytes::from(reply.body),
            Vec::new(),
        ))
    }
}
