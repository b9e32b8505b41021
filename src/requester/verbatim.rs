// src/requester/verbatim.rs
// =============================================================================
// Requests whose path has "." or ".." segments.
//
// reqwest parses every URL with url::Url, which resolves those segments:
// "static/../../etc/passwd" would go out as "/etc/passwd". These requests
// are sent on a hyper connection opened here instead, and http::Uri keeps
// the path exactly as the dictionary wrote it.
//
// Routes:
// - direct (pinned addresses for the target host when we have them)
// - http:// proxy: absolute-form request line, or CONNECT for https targets
// - socks5:// proxy
//
// The configured timeout covers the whole exchange, body included, the way
// reqwest's does.
// =============================================================================

use crate::error::{RequestError, RequestErrorKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use hyper::body::HttpBody;
use hyper::client::conn::{self, SendRequest};
use hyper::{Body, Request, Uri};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderMap, HeaderValue, HOST, PROXY_AUTHORIZATION};
use reqwest::Method;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;
use url::Url;

// Bytes http::Uri refuses, escaped the way a browser would
const WIRE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const DOT_SEGMENTS: &[&str] = &[".", "..", "%2e", ".%2e", "%2e.", "%2e%2e"];

const MAX_CONNECT_RESPONSE: usize = 8192;

// True when url::Url would rewrite the path of `url`
pub fn has_dot_segments(url: &str) -> bool {
    let path = match url.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(index) => &rest[index..],
            None => return false,
        },
        None => url,
    };
    let path = &path[..path.find(['?', '#']).unwrap_or(path.len())];
    path.split(['/', '\\'])
        .any(|segment| DOT_SEGMENTS.contains(&segment.to_ascii_lowercase().as_str()))
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

// Where a URL points, with its path left alone
struct Endpoint {
    https: bool,
    /// Bare host, "::1" for an IPv6 literal
    host: String,
    port: u16,
    /// Host header value: host, brackets for IPv6, and the port if the URL
    /// carries one
    authority: String,
    /// Escaped path and query, always starting with '/'
    path: String,
}

impl Endpoint {
    fn parse(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        let https = match scheme.to_ascii_lowercase().as_str() {
            "http" => false,
            "https" => true,
            _ => return None,
        };

        let split = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(split);
        let authority = authority.rsplit('@').next().unwrap_or(authority);
        let parsed = Url::parse(&format!("{}://{}/", scheme, authority)).ok()?;
        let host = parsed.host_str()?.trim_start_matches('[').trim_end_matches(']');

        let path = &path[..path.find('#').unwrap_or(path.len())];
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Some(Self {
            https,
            host: host.to_string(),
            port: parsed.port_or_known_default()?,
            authority: authority.to_string(),
            path: utf8_percent_encode(&path, WIRE_SET).to_string(),
        })
    }

    fn connect_authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// An open connection to one URL, ready for one or more exchanges
pub struct VerbatimConnection {
    url: String,
    uri: Uri,
    host: HeaderValue,
    proxy_authorization: Option<HeaderValue>,
    sender: SendRequest<Body>,
    deadline: Instant,
}

// A response whose body is still on the wire
pub struct VerbatimResponse {
    inner: hyper::Response<Body>,
    url: String,
    deadline: Instant,
}

impl VerbatimConnection {
    // Connects to the server behind `url`, through `proxy` if given.
    // `pinned` are the addresses to use for `pinned_host`.
    pub async fn open(
        url: &str,
        proxy: Option<&str>,
        pinned_host: &str,
        pinned: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self, RequestError> {
        let deadline = Instant::now() + timeout;
        let endpoint = Endpoint::parse(url).ok_or_else(|| invalid_url(url))?;
        let pinned = if endpoint.host.eq_ignore_ascii_case(pinned_host) {
            pinned
        } else {
            &[]
        };

        within(deadline, url, async {
            let (io, absolute, proxy_authorization) = match proxy {
                None => (connect_direct(&endpoint, pinned).await?, false, None),
                Some(proxy) => connect_proxied(&endpoint, proxy).await?,
            };

            let io: Box<dyn Io> = if endpoint.https {
                Box::new(tls(io, &endpoint).await?)
            } else {
                io
            };

            let (sender, connection) = conn::handshake(io).await.map_err(|e| {
                debug!(error = %e, "handshake failed");
                connect_error(&endpoint)
            })?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!(error = %e, "connection closed");
                }
            });

            let target = if absolute {
                format!("http://{}{}", endpoint.authority, endpoint.path)
            } else {
                endpoint.path.clone()
            };
            let uri = Uri::try_from(target).map_err(|_| invalid_url(url))?;
            let host = HeaderValue::from_str(&endpoint.authority).map_err(|_| invalid_url(url))?;

            Ok(Self {
                url: url.to_string(),
                uri,
                host,
                proxy_authorization,
                sender,
                deadline,
            })
        })
        .await
    }

    pub async fn send(
        &mut self,
        method: &Method,
        headers: HeaderMap,
        body: Option<&str>,
    ) -> Result<VerbatimResponse, RequestError> {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let mut request = Request::builder()
            .method(method.clone())
            .uri(self.uri.clone())
            .body(body)
            .map_err(|_| invalid_url(&self.url))?;

        *request.headers_mut() = headers;
        request.headers_mut().insert(HOST, self.host.clone());
        if let Some(value) = &self.proxy_authorization {
            request.headers_mut().insert(PROXY_AUTHORIZATION, value.clone());
        }

        let url = self.url.clone();
        let deadline = self.deadline;
        let sender = &mut self.sender;
        let inner = within(deadline, &url, async {
            std::future::poll_fn(|cx| sender.poll_ready(cx)).await.map_err(|e| hyper_error(&e, &url))?;
            sender.send_request(request).await.map_err(|e| hyper_error(&e, &url))
        })
        .await?;

        Ok(VerbatimResponse {
            inner,
            url,
            deadline,
        })
    }
}

impl VerbatimResponse {
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub async fn chunk(&mut self) -> Result<Option<Bytes>, RequestError> {
        let url = self.url.clone();
        let body = self.inner.body_mut();
        within(self.deadline, &url, async {
            match body.data().await {
                Some(Ok(chunk)) => Ok(Some(chunk)),
                Some(Err(_)) => Err(RequestError::new(
                    RequestErrorKind::ReadBody,
                    format!("Failed to read response body: {}", url),
                )),
                None => Ok(None),
            }
        })
        .await
    }
}

async fn within<T>(
    deadline: Instant,
    url: &str,
    future: impl Future<Output = Result<T, RequestError>>,
) -> Result<T, RequestError> {
    match tokio::time::timeout_at(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::new(
            RequestErrorKind::Timeout,
            format!("Request timeout: {}", url),
        )),
    }
}

async fn connect_direct(endpoint: &Endpoint, pinned: &[SocketAddr]) -> Result<Box<dyn Io>, RequestError> {
    let addrs: Vec<SocketAddr> = if pinned.is_empty() {
        tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|_| RequestError::new(RequestErrorKind::Dns, "Couldn't resolve DNS"))?
            .collect()
    } else {
        pinned.to_vec()
    };

    let stream = TcpStream::connect(&addrs[..])
        .await
        .map_err(|_| connect_error(endpoint))?;
    Ok(Box::new(stream))
}

// Returns the stream, whether requests must use the absolute form, and the
// Proxy-Authorization header for them
async fn connect_proxied(
    endpoint: &Endpoint,
    proxy: &str,
) -> Result<(Box<dyn Io>, bool, Option<HeaderValue>), RequestError> {
    let invalid = || {
        RequestError::new(
            RequestErrorKind::InvalidProxyUrl,
            format!("Invalid proxy URL: {}", proxy),
        )
    };
    let failed = || RequestError::new(RequestErrorKind::Proxy, format!("Error with the proxy: {}", proxy));

    let parsed = Url::parse(proxy).map_err(|_| invalid())?;
    let host = parsed
        .host_str()
        .ok_or_else(invalid)?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = parsed.port_or_known_default().unwrap_or(1080);
    let username = (!parsed.username().is_empty()).then(|| parsed.username().to_string());
    let password = parsed.password().unwrap_or_default().to_string();

    match parsed.scheme() {
        "http" | "https" => {
            let mut stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|_| failed())?;
            let authorization = username
                .map(|user| format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password))))
                .and_then(|value| HeaderValue::from_str(&value).ok());

            if endpoint.https {
                tunnel(&mut stream, endpoint, authorization.as_ref())
                    .await
                    .map_err(|_| failed())?;
                Ok((Box::new(stream), false, None))
            } else {
                Ok((Box::new(stream), true, authorization))
            }
        }
        "socks5" | "socks5h" => {
            let target = (endpoint.host.as_str(), endpoint.port);
            let stream = match username {
                Some(user) => {
                    Socks5Stream::connect_with_password((host.as_str(), port), target, &user, &password).await
                }
                None => Socks5Stream::connect((host.as_str(), port), target).await,
            }
            .map_err(|_| failed())?;
            Ok((Box::new(stream.into_inner()), false, None))
        }
        _ => Err(invalid()),
    }
}

// HTTP CONNECT through a proxy. Anything but a 2xx answer is a failure.
async fn tunnel(
    stream: &mut TcpStream,
    endpoint: &Endpoint,
    authorization: Option<&HeaderValue>,
) -> std::io::Result<()> {
    let target = endpoint.connect_authority();
    let mut request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", target);
    if let Some(value) = authorization.and_then(|v| v.to_str().ok()) {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut head = Vec::new();
    let mut buffer = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream.read(&mut buffer).await?;
        if read == 0 || head.len() > MAX_CONNECT_RESPONSE {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.extend_from_slice(&buffer[..read]);
    }

    let status = head.split(|&b| b == b' ').nth(1).unwrap_or_default();
    if status.first() == Some(&b'2') {
        Ok(())
    } else {
        Err(std::io::ErrorKind::ConnectionRefused.into())
    }
}

async fn tls(io: Box<dyn Io>, endpoint: &Endpoint) -> Result<impl Io, RequestError> {
    let ssl_error = || RequestError::new(RequestErrorKind::Tls, "Unexpected SSL error");
    let name = ServerName::try_from(endpoint.host.as_str()).map_err(|_| ssl_error())?;
    tls_connector().connect(name, io).await.map_err(|e| {
        debug!(error = %e, "TLS handshake failed");
        ssl_error()
    })
}

// Certificates are not verified, same as the reqwest clients
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

fn tls_connector() -> TlsConnector {
    static CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();
    CONNECTOR
        .get_or_init(|| {
            let config = ClientConfig::builder()
                .with_safe_defaults()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth();
            TlsConnector::from(Arc::new(config))
        })
        .clone()
}

fn hyper_error(error: &hyper::Error, url: &str) -> RequestError {
    debug!(url, error = %error, "exchange failed");
    if error.is_parse() {
        RequestError::new(
            RequestErrorKind::Other,
            format!("There was a problem in the request to: {}", url),
        )
    } else {
        RequestError::new(
            RequestErrorKind::Connection,
            format!("Cannot connect to: {}", Endpoint::parse(url).map(|e| e.authority).unwrap_or_default()),
        )
    }
}

fn connect_error(endpoint: &Endpoint) -> RequestError {
    RequestError::new(
        RequestErrorKind::Connection,
        format!("Cannot connect to: {}", endpoint.authority),
    )
}

fn invalid_url(url: &str) -> RequestError {
    RequestError::new(RequestErrorKind::InvalidUrl, format!("Invalid URL: {}", url))
}
