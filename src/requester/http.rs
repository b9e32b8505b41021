// src/requester/http.rs
// =============================================================================
// The reqwest-backed Requester.
//
// One request, start to finish:
// 1. Pick a proxy (the caller's override, or a random one from the pool)
// 2. Send base_url + path with the configured method, headers and body.
//    Paths with "." or ".." segments go through verbatim.rs so they reach
//    the server unchanged.
// 3. Answer a 401 auth challenge once (Digest, NTLM)
// 4. Follow redirects ourselves when asked to, recording the history
// 5. Read the body chunk by chunk, up to the size cap
// 6. On failure, classify the error; try again until the retry budget is
//    spent, then return the last classified error
//
// reqwest's own redirect handling is turned off: we need the intermediate
// URLs, and a "too many redirects" that we can name.
// =============================================================================

use super::auth::Authenticator;
use super::dns::DnsCache;
use super::response::{has_binary_bytes, Response};
use super::verbatim::{has_dot_segments, VerbatimConnection, VerbatimResponse};
use super::Requester;
use crate::config::{RequestOptions, Target};
use crate::error::{ConfigError, RequestError, RequestErrorKind};
use crate::paths::parse_path;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, COOKIE, LOCATION,
    USER_AGENT, WWW_AUTHENTICATE,
};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::error::Error as _;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};
use url::Url;

const MAX_REDIRECTS: usize = 30;

const DEFAULT_USER_AGENT: &str = concat!("dirhound/", env!("CARGO_PKG_VERSION"));

// Picked from at random when --random-agent is set
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.144 Mobile Safari/537.36",
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
];

pub struct HttpRequester {
    base_url: String,
    host: String,
    method: Method,
    options: RequestOptions,
    headers: HeaderMap,
    auth: Option<Authenticator>,
    /// Addresses the client is pinned to for the target host
    pinned: Vec<SocketAddr>,
    direct: Client,
    /// The live proxy pool; failing proxies are removed from it
    proxies: Mutex<Vec<String>>,
    proxy_clients: Mutex<HashMap<String, Client>>,
}

impl HttpRequester {
    pub async fn new(
        options: &RequestOptions,
        target: &Target,
        dns: &DnsCache,
    ) -> Result<Self, ConfigError> {
        let method = Method::from_bytes(options.method.to_uppercase().as_bytes())
            .map_err(|_| ConfigError::Client(format!("invalid HTTP method '{}'", options.method)))?;

        let headers = default_headers(options)?;

        // An IP literal needs no pinning. Otherwise --ip wins over DNS.
        let pinned = if target.host.parse::<IpAddr>().is_ok() {
            Vec::new()
        } else if let Some(ip) = options.ip {
            let addrs = vec![SocketAddr::new(ip, target.port)];
            dns.insert(&target.host, target.port, addrs.clone());
            addrs
        } else {
            dns.resolve(&target.host, target.port).await
        };

        let direct = client_builder(options, &target.host, &pinned)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            base_url: target.base_url.clone(),
            host: target.host.clone(),
            method,
            options: options.clone(),
            headers,
            auth: options.auth.as_ref().map(Authenticator::new),
            pinned,
            direct,
            proxies: Mutex::new(options.proxies.clone()),
            proxy_clients: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, RequestError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxy_clients.lock();
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let invalid = || {
            RequestError::new(
                RequestErrorKind::InvalidProxyUrl,
                format!("Invalid proxy URL: {}", proxy),
            )
        };
        let client = client_builder(&self.options, &self.host, &self.pinned)
            .proxy(reqwest::Proxy::all(proxy).map_err(|_| invalid())?)
            .build()
            .map_err(|_| invalid())?;
        clients.insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    fn pick_proxy(&self) -> Option<String> {
        self.proxies.lock().choose(&mut rand::thread_rng()).cloned()
    }

    // A dead proxy leaves the pool, unless it is the last one
    fn drop_proxy(&self, proxy: &str) {
        let mut proxies = self.proxies.lock();
        if proxies.len() > 1 {
            if let Some(position) = proxies.iter().position(|p| p == proxy) {
                proxies.remove(position);
                warn!(proxy, "removing failing proxy from the pool");
            }
        }
    }

    // One attempt: the request plus any redirects we follow
    async fn attempt(&self, url: &str, proxy: Option<&str>) -> Result<Response, RequestError> {
        let client = self.client_for(proxy)?;
        let mut method = self.method.clone();
        let mut current = url.to_string();
        let mut history = Vec::new();

        loop {
            let (status, headers, body) = self.send(&client, &method, &current, proxy).await?;

            let location = headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if self.options.follow_redirects && is_redirect(status) => {
                    if history.len() >= MAX_REDIRECTS {
                        return Err(RequestError::new(
                            RequestErrorKind::TooManyRedirects,
                            format!("Too many redirects: {}", url),
                        ));
                    }
                    let next = Url::parse(&current)
                        .and_then(|base| base.join(&location))
                        .map_err(|_| {
                            RequestError::new(
                                RequestErrorKind::InvalidUrl,
                                format!("Invalid URL: {}", location),
                            )
                        })?;
                    if status == 303 || (matches!(status, 301 | 302) && method == Method::POST) {
                        method = Method::GET;
                    }
                    history.push(std::mem::replace(&mut current, next.to_string()));
                }
                _ => return Ok(Response::new(current, status, headers, body, history)),
            }
        }
    }

    // One HTTP exchange, answering an auth challenge if there is one
    async fn send(
        &self,
        client: &Client,
        method: &Method,
        url: &str,
        proxy: Option<&str>,
    ) -> Result<(u16, HeaderMap, Bytes), RequestError> {
        let mut transport = if has_dot_segments(url) {
            let connection =
                VerbatimConnection::open(url, proxy, &self.host, &self.pinned, self.options.timeout)
                    .await?;
            Transport::Verbatim(connection)
        } else {
            Transport::Client(client)
        };

        let preemptive = self.auth.as_ref().and_then(Authenticator::preemptive_header);
        let mut reply = self.exchange(&mut transport, method, url, proxy, preemptive).await?;

        if reply.status() == 401 {
            let answer = self.auth.as_ref().and_then(|auth| {
                let challenge = reply.headers().get(WWW_AUTHENTICATE)?.to_str().ok()?;
                let uri = format!("/{}", parse_path(url));
                auth.challenge_response(method.as_str(), &uri, challenge)
            });
            if let Some(answer) = answer {
                // drain so the connection can be reused for NTLM
                while let Ok(Some(_)) = reply.chunk(url, proxy).await {}
                reply = self
                    .exchange(&mut transport, method, url, proxy, Some(answer))
                    .await?;
            }
        }

        let status = reply.status();
        let headers = reply.headers().clone();
        let body = self.read_body(reply, url, proxy).await?;

        debug!(
            method = %method,
            url,
            status,
            size = body.len(),
            redirect = headers.get(LOCATION).and_then(|v| v.to_str().ok()).unwrap_or(""),
            "response"
        );

        Ok((status, headers, body))
    }

    async fn exchange(
        &self,
        transport: &mut Transport<'_>,
        method: &Method,
        url: &str,
        proxy: Option<&str>,
        authorization: Option<String>,
    ) -> Result<Reply, RequestError> {
        let headers = self.request_headers(authorization);
        match transport {
            Transport::Client(client) => {
                let mut request = client.request(method.clone(), url).headers(headers);
                if let Some(data) = &self.options.data {
                    request = request.body(data.clone());
                }
                request
                    .send()
                    .await
                    .map(Reply::Client)
                    .map_err(|e| classify(&e, url, proxy))
            }
            Transport::Verbatim(connection) => connection
                .send(method, headers, self.options.data.as_deref())
                .await
                .map(Reply::Verbatim),
        }
    }

    fn request_headers(&self, authorization: Option<String>) -> HeaderMap {
        let mut headers = self.headers.clone();
        if self.options.random_agents {
            if let Some(agent) = USER_AGENTS.choose(&mut rand::thread_rng()) {
                headers.insert(USER_AGENT, HeaderValue::from_static(*agent));
            }
        }
        if let Some(value) = authorization.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    // Reads until the body ends or the cap is hit. A body whose length was
    // declared stops as soon as a binary chunk shows up.
    async fn read_body(
        &self,
        mut reply: Reply,
        url: &str,
        proxy: Option<&str>,
    ) -> Result<Bytes, RequestError> {
        let declared = reply.headers().contains_key(CONTENT_LENGTH);
        let limit = self.options.max_response_size;
        let mut body = BytesMut::new();

        while let Some(chunk) = reply.chunk(url, proxy).await? {
            body.extend_from_slice(&chunk);
            if body.len() >= limit {
                body.truncate(limit);
                break;
            }
            if declared && has_binary_bytes(&chunk) {
                break;
            }
        }

        Ok(body.freeze())
    }
}

// How one request leaves: the shared reqwest client, or a connection of its
// own when the path must not be normalized
enum Transport<'a> {
    Client(&'a Client),
    Verbatim(VerbatimConnection),
}

// A response whose body is still on the wire
enum Reply {
    Client(reqwest::Response),
    Verbatim(VerbatimResponse),
}

impl Reply {
    fn status(&self) -> u16 {
        match self {
            Reply::Client(response) => response.status().as_u16(),
            Reply::Verbatim(response) => response.status(),
        }
    }

    fn headers(&self) -> &HeaderMap {
        match self {
            Reply::Client(response) => response.headers(),
            Reply::Verbatim(response) => response.headers(),
        }
    }

    async fn chunk(&mut self, url: &str, proxy: Option<&str>) -> Result<Option<Bytes>, RequestError> {
        match self {
            Reply::Client(response) => response.chunk().await.map_err(|e| classify(&e, url, proxy)),
            Reply::Verbatim(response) => response.chunk().await,
        }
    }
}

#[async_trait]
impl Requester for HttpRequester {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, path: &str, proxy: Option<&str>) -> Result<Response, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = RequestError::new(
            RequestErrorKind::Other,
            format!("There was a problem in the request to: {}", url),
        );

        for attempt in 0..=self.options.max_retries {
            let chosen = match proxy {
                Some(p) => Some(p.to_string()),
                None => self.pick_proxy(),
            };

            match self.attempt(&url, chosen.as_deref()).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    debug!(
                        url = %url,
                        attempt,
                        transient = err.kind.is_transient(),
                        error = %err,
                        "request failed"
                    );
                    if matches!(err.kind, RequestErrorKind::Proxy | RequestErrorKind::InvalidProxyUrl) {
                        if let Some(p) = &chosen {
                            self.drop_proxy(p);
                        }
                    }
                    // every kind uses up an attempt; the next one may pick
                    // another proxy
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

fn client_builder(
    options: &RequestOptions,
    host: &str,
    pinned: &[SocketAddr],
) -> reqwest::ClientBuilder {
    let mut builder = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(options.timeout)
        .danger_accept_invalid_certs(true);
    if !pinned.is_empty() {
        builder = builder.resolve_to_addrs(host, pinned);
    }
    builder
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn default_headers(options: &RequestOptions) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

    let invalid = |name: &str, value: &str| ConfigError::InvalidHeader {
        header: format!("{}: {}", name, value),
    };

    for (name, value) in &options.headers {
        let header_name =
            HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid(name, value))?;
        let header_value =
            HeaderValue::from_str(value.trim()).map_err(|_| invalid(name, value))?;
        headers.insert(header_name, header_value);
    }
    if let Some(agent) = &options.user_agent {
        let value = HeaderValue::from_str(agent).map_err(|_| invalid("User-Agent", agent))?;
        headers.insert(USER_AGENT, value);
    }
    if let Some(cookie) = &options.cookie {
        let value = HeaderValue::from_str(cookie).map_err(|_| invalid("Cookie", cookie))?;
        headers.insert(COOKIE, value);
    }

    Ok(headers)
}

// Names what went wrong, the way the message will be shown to the user.
// reqwest only exposes a few predicates, the rest comes from the text of the
// source chain (not the top-level message, which embeds the URL).
fn classify(error: &reqwest::Error, url: &str, proxy: Option<&str>) -> RequestError {
    let mut chain = String::new();
    let mut source = error.source();
    while let Some(inner) = source {
        chain.push_str(" | ");
        chain.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }

    let (kind, message) = if error.is_timeout() {
        (RequestErrorKind::Timeout, format!("Request timeout: {}", url))
    } else if error.is_redirect() {
        (RequestErrorKind::TooManyRedirects, format!("Too many redirects: {}", url))
    } else if error.is_builder() {
        (RequestErrorKind::InvalidUrl, format!("Invalid URL: {}", url))
    } else if error.is_body() || error.is_decode() {
        (
            RequestErrorKind::ReadBody,
            format!("Failed to read response body: {}", url),
        )
    } else if let Some(proxy) = proxy.filter(|_| error.is_connect() || chain.contains("proxy")) {
        (RequestErrorKind::Proxy, format!("Error with the proxy: {}", proxy))
    } else if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
    {
        (RequestErrorKind::Dns, "Couldn't resolve DNS".to_string())
    } else if chain.contains("certificate")
        || chain.contains("tls")
        || chain.contains("ssl")
        || chain.contains("handshake")
    {
        (RequestErrorKind::Tls, "Unexpected SSL error".to_string())
    } else if error.is_connect() || error.is_request() {
        (
            RequestErrorKind::Connection,
            format!("Cannot connect to: {}", netloc(url)),
        )
    } else {
        (
            RequestErrorKind::Other,
            format!("There was a problem in the request to: {}", url),
        )
    };

    RequestError::new(kind, message)
}

fn netloc(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, AuthScheme};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use warp::http::StatusCode;
    use warp::Filter;

    const CLOSE_OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

    // Plain TCP server: answers every request with `reply` and reports the
    // request line it received
    async fn spawn_line_server(reply: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let sender = sender.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buffer = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buffer).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buffer[..n]),
                        }
                    }
                    let text = String::from_utf8_lossy(&head).to_string();
                    let _ = sender.send(text.lines().next().unwrap_or_default().to_string());
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (addr, receiver)
    }

    async fn spawn_server() -> SocketAddr {
        let ok = warp::path("ok").map(|| "hello");
        let moved = warp::path("moved").map(|| {
            warp::reply::with_header(
                warp::reply::with_status("", StatusCode::MOVED_PERMANENTLY),
                "location",
                "/ok",
            )
        });
        let looping = warp::path("loop").map(|| {
            warp::reply::with_header(
                warp::reply::with_status("", StatusCode::FOUND),
                "location",
                "/loop",
            )
        });
        let echo = warp::path("echo")
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::header::optional::<String>("user-agent"))
            .and(warp::header::optional::<String>("x-scan"))
            .map(|auth: Option<String>, agent: Option<String>, scan: Option<String>| {
                format!(
                    "{}|{}|{}",
                    auth.unwrap_or_default(),
                    agent.unwrap_or_default(),
                    scan.unwrap_or_default()
                )
            });
        let binary = warp::path("blob").map(|| {
            let mut body = vec![0u8; 4096];
            body[0] = b'P';
            warp::reply::with_header(body, "content-length", "4096")
        });

        let routes = ok.or(moved).or(looping).or(echo).or(binary);
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    async fn requester(addr: SocketAddr, options: RequestOptions) -> HttpRequester {
        let target = Target::parse(&format!("http://{}/", addr)).unwrap();
        HttpRequester::new(&options, &target, &DnsCache::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_plain_request() {
        let addr = spawn_server().await;
        let requester = requester(addr, RequestOptions::default()).await;
        let response = requester.request("ok", None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content, "hello");
        assert_eq!(response.path, "ok");
        assert!(response.history.is_empty());
    }

    #[tokio::test]
    async fn test_redirects_are_reported_not_followed_by_default() {
        let addr = spawn_server().await;
        let requester = requester(addr, RequestOptions::default()).await;
        let response = requester.request("moved", None).await.unwrap();
        assert_eq!(response.status, 301);
        assert_eq!(response.redirect, "/ok");
    }

    #[tokio::test]
    async fn test_followed_redirects_record_history() {
        let addr = spawn_server().await;
        let options = RequestOptions {
            follow_redirects: true,
            ..RequestOptions::default()
        };
        let requester = requester(addr, options).await;
        let response = requester.request("moved", None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content, "hello");
        assert_eq!(response.history, vec![format!("http://{}/moved", addr)]);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_too_many_redirects() {
        let addr = spawn_server().await;
        let options = RequestOptions {
            follow_redirects: true,
            max_retries: 0,
            ..RequestOptions::default()
        };
        let requester = requester(addr, options).await;
        let err = requester.request("loop", None).await.unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::TooManyRedirects);
        assert!(err.message.starts_with("Too many redirects:"));
    }

    #[tokio::test]
    async fn test_headers_agent_and_basic_auth_are_sent() {
        let addr = spawn_server().await;
        let options = RequestOptions {
            headers: vec![("X-Scan".to_string(), "yes".to_string())],
            user_agent: Some("custom-agent".to_string()),
            auth: Some(AuthConfig {
                scheme: AuthScheme::Basic,
                credential: "user:pass".to_string(),
            }),
            ..RequestOptions::default()
        };
        let requester = requester(addr, options).await;
        let response = requester.request("echo", None).await.unwrap();
        assert_eq!(response.content, "Basic dXNlcjpwYXNz|custom-agent|yes");
    }

    #[tokio::test]
    async fn test_binary_body_with_length_is_cut_short() {
        let addr = spawn_server().await;
        let requester = requester(addr, RequestOptions::default()).await;
        let response = requester.request("blob", None).await.unwrap();
        assert!(response.is_binary());
        assert_eq!(response.content, "");
        assert_eq!(response.length(), 4096);
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified_after_retries() {
        // Bind and drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let options = RequestOptions {
            max_retries: 2,
            timeout: Duration::from_secs(2),
            ..RequestOptions::default()
        };
        let target = Target::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let requester = HttpRequester::new(&options, &target, &DnsCache::new())
            .await
            .unwrap();
        let err = requester.request("x", None).await.unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::Connection);
        assert_eq!(err.message, format!("Cannot connect to: 127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn test_proxy_pool_keeps_last_proxy() {
        let addr = spawn_server().await;
        let options = RequestOptions {
            proxies: vec!["http://127.0.0.1:1".to_string(), "http://127.0.0.1:2".to_string()],
            ..RequestOptions::default()
        };
        let requester = requester(addr, options).await;
        requester.drop_proxy("http://127.0.0.1:1");
        requester.drop_proxy("http://127.0.0.1:2");
        assert_eq!(*requester.proxies.lock(), vec!["http://127.0.0.1:2".to_string()]);
    }

    #[tokio::test]
    async fn test_dot_segments_reach_the_server_unchanged() {
        let (addr, mut lines) = spawn_line_server(CLOSE_OK).await;
        let requester = requester(addr, RequestOptions::default()).await;

        let response = requester.request("static/../../etc/passwd", None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content, "ok");
        assert_eq!(lines.recv().await.unwrap(), "GET /static/../../etc/passwd HTTP/1.1");

        requester.request("a/./b/%2e%2e/c?x=1", None).await.unwrap();
        assert_eq!(lines.recv().await.unwrap(), "GET /a/./b/%2e%2e/c?x=1 HTTP/1.1");

        // no dot segment: the regular client
        requester.request("plain/path", None).await.unwrap();
        assert_eq!(lines.recv().await.unwrap(), "GET /plain/path HTTP/1.1");
    }

    #[tokio::test]
    async fn test_dot_segments_through_a_proxy_use_the_absolute_form() {
        let (proxy, mut lines) = spawn_line_server(CLOSE_OK).await;
        let target = Target::parse("http://scan.invalid:8080/").unwrap();
        let requester = HttpRequester::new(&RequestOptions::default(), &target, &DnsCache::new())
            .await
            .unwrap();

        let proxy_url = format!("http://{}", proxy);
        let response = requester.request("x/../../admin", Some(&proxy_url)).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(
            lines.recv().await.unwrap(),
            "GET http://scan.invalid:8080/x/../../admin HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_transient_errors_use_the_whole_retry_budget() {
        // accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let options = RequestOptions {
            max_retries: 2,
            timeout: Duration::from_millis(200),
            ..RequestOptions::default()
        };
        let requester = requester(addr, options).await;
        let err = requester.request("slow", None).await.unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::Timeout);
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failing_proxy_leaves_the_pool_during_requests() {
        let (proxy, _lines) = spawn_line_server(CLOSE_OK).await;
        let good = format!("http://{}", proxy);
        let options = RequestOptions {
            proxies: vec!["http://[bad".to_string(), good.clone()],
            max_retries: 5,
            ..RequestOptions::default()
        };
        let requester = requester(proxy, options).await;

        for _ in 0..10 {
            let response = requester.request("ok", None).await.unwrap();
            assert_eq!(response.content, "ok");
        }
        assert_eq!(*requester.proxies.lock(), vec![good]);
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let options = RequestOptions {
            headers: vec![("Bad Name".to_string(), "x".to_string())],
            ..RequestOptions::default()
        };
        assert!(matches!(
            default_headers(&options),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }
}
