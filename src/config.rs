// src/config.rs
// =============================================================================
// The scan configuration.
//
// cli.rs turns command-line arguments into a Config, validate() checks it
// once, and from then on it is shared read-only (Arc<Config>) by every part
// of the scanner. Nothing mutates it during a scan: state that does change
// (the live proxy pool, the job queue) lives in the component that owns it.
//
// Rust concepts:
// - Grouping options into small structs so each component only borrows the
//   part it needs
// - Validation returning Result<(), ConfigError> before any I/O happens
// =============================================================================

use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_THREADS: usize = 25;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(7500);
pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 80 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub targets: Vec<String>,
    pub wordlists: Vec<PathBuf>,
    pub dictionary: DictionaryOptions,
    pub request: RequestOptions,
    pub fuzz: FuzzOptions,
    pub recursion: RecursionOptions,
    pub filters: FilterOptions,
    pub control: ControlOptions,
    pub output: OutputOptions,
}

// How dictionary entries are cased after expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseRule {
    #[default]
    Preserve,
    Lowercase,
    Uppercase,
    Capitalize,
}

#[derive(Debug, Clone, Default)]
pub struct DictionaryOptions {
    pub extensions: Vec<String>,
    pub exclude_extensions: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    pub force_extensions: bool,
    pub only_selected: bool,
    pub no_extension: bool,
    pub case: CaseRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest,
    Bearer,
    Ntlm,
}

impl AuthScheme {
    pub fn name(&self) -> &'static str {
        match self {
            AuthScheme::Basic => "basic",
            AuthScheme::Digest => "digest",
            AuthScheme::Bearer => "bearer",
            AuthScheme::Ntlm => "ntlm",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub scheme: AuthScheme,
    /// "user:password", or the token itself for bearer
    pub credential: String,
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub data: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub follow_redirects: bool,
    pub random_agents: bool,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
    pub auth: Option<AuthConfig>,
    pub proxies: Vec<String>,
    pub ip: Option<IpAddr>,
    pub max_response_size: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Vec::new(),
            data: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            follow_redirects: false,
            random_agents: false,
            user_agent: None,
            cookie: None,
            auth: None,
            proxies: Vec::new(),
            ip: None,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuzzOptions {
    pub threads: usize,
    /// Pause between two requests of the same worker
    pub delay: Duration,
    /// Requests per second across all workers, 0 = unlimited
    pub max_rate: usize,
    /// A path whose response is treated as another "not found" baseline
    pub exclude_response: Option<String>,
    pub crawl: bool,
}

impl Default for FuzzOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            delay: Duration::ZERO,
            max_rate: 0,
            exclude_response: None,
            crawl: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecursionOptions {
    pub recursive: bool,
    pub deep_recursive: bool,
    pub force_recursive: bool,
    /// 0 = unlimited
    pub max_depth: usize,
    pub status_codes: HashSet<u16>,
    pub exclude_subdirs: Vec<String>,
    /// Directories to start from instead of the target root
    pub subdirs: Vec<String>,
}

impl RecursionOptions {
    pub fn enabled(&self) -> bool {
        self.recursive || self.deep_recursive || self.force_recursive
    }
}

impl Default for RecursionOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            deep_recursive: false,
            force_recursive: false,
            max_depth: 0,
            status_codes: (100..=999).collect(),
            exclude_subdirs: Vec::new(),
            subdirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub include_status: HashSet<u16>,
    pub exclude_status: HashSet<u16>,
    /// Human readable sizes as printed in results, e.g. "0B" or "4KB"
    pub exclude_sizes: Vec<String>,
    pub min_response_size: usize,
    /// 0 = no limit
    pub max_response_size: usize,
    pub exclude_texts: Vec<String>,
    pub exclude_regex: Option<String>,
    pub exclude_redirect: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ControlOptions {
    pub max_time: Option<Duration>,
    pub target_max_time: Option<Duration>,
    pub exit_on_error: bool,
    pub skip_on_status: HashSet<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            wordlists: Vec::new(),
            dictionary: DictionaryOptions::default(),
            request: RequestOptions::default(),
            fuzz: FuzzOptions::default(),
            recursion: RecursionOptions::default(),
            filters: FilterOptions::default(),
            control: ControlOptions::default(),
            output: OutputOptions::default(),
        }
    }
}

impl Config {
    // Checks everything that can be checked without the network.
    // Any error here means we exit before sending a single request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        for target in &self.targets {
            Target::parse(target)?;
        }

        if self.wordlists.is_empty() {
            return Err(ConfigError::MissingWordlist);
        }

        if self.fuzz.threads == 0 {
            return Err(ConfigError::InvalidConcurrency { value: 0 });
        }

        for extension in &self.dictionary.extensions {
            if self.dictionary.exclude_extensions.contains(extension) {
                return Err(ConfigError::ConflictingExtension {
                    extension: extension.clone(),
                });
            }
        }

        for pattern in [&self.filters.exclude_regex, &self.filters.exclude_redirect]
            .into_iter()
            .flatten()
        {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                pattern: pattern.clone(),
                source,
            })?;
        }

        if let Some(auth) = &self.request.auth {
            if auth.scheme != AuthScheme::Bearer && !auth.credential.contains(':') {
                return Err(ConfigError::InvalidCredential {
                    scheme: auth.scheme.name().to_string(),
                });
            }
        }

        for proxy in &self.request.proxies {
            reqwest::Proxy::all(proxy.as_str()).map_err(|_| ConfigError::InvalidProxy {
                proxy: proxy.clone(),
            })?;
        }

        Ok(())
    }
}

// A scan target split into the part the requester talks to
// (scheme://host:port/) and the path the scan starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Always ends with '/'
    pub base_url: String,
    pub host: String,
    pub port: u16,
    /// No leading '/', ends with '/' unless empty
    pub path: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };

        let url = Url::parse(&with_scheme).map_err(|source| match source {
            url::ParseError::InvalidPort => ConfigError::InvalidPort {
                input: raw.to_string(),
            },
            _ => ConfigError::InvalidUrl {
                url: raw.to_string(),
                source,
            },
        })?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::UnsupportedScheme {
                url: raw.to_string(),
                scheme: scheme.to_string(),
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl {
                url: raw.to_string(),
                source: url::ParseError::EmptyHost,
            })?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConfigError::InvalidPort {
                input: raw.to_string(),
            })?;

        let base_url = match url.port() {
            Some(p) => format!("{}://{}:{}/", scheme, host, p),
            None => format!("{}://{}/", scheme, host),
        };

        let mut path = url.path().trim_start_matches('/').to_string();
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }

        Ok(Self {
            base_url,
            host,
            port,
            path,
        })
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(target: &str) -> Config {
        Config {
            targets: vec![target.to_string()],
            wordlists: vec![PathBuf::from("words.txt")],
            ..Config::default()
        }
    }

    #[test]
    fn test_target_without_scheme_defaults_to_http() {
        let target = Target::parse("example.com/app").unwrap();
        assert_eq!(target.base_url, "http://example.com/");
        assert_eq!(target.port, 80);
        assert_eq!(target.path, "app/");
    }

    #[test]
    fn test_target_keeps_explicit_port() {
        let target = Target::parse("https://example.com:8443/").unwrap();
        assert_eq!(target.base_url, "https://example.com:8443/");
        assert_eq!(target.port, 8443);
        assert_eq!(target.path, "");
    }

    #[test]
    fn test_target_rejects_other_schemes() {
        let err = Target::parse("ftp://example.com/").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));
    }

    #[test]
    fn test_target_rejects_bad_port() {
        let err = Target::parse("http://example.com:99999/").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }

    #[test]
    fn test_validate_conflicting_extensions() {
        let mut config = config_with("http://example.com");
        config.dictionary.extensions = vec!["php".to_string()];
        config.dictionary.exclude_extensions = vec!["php".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConflictingExtension { .. })
        ));
    }

    #[test]
    fn test_validate_bad_regex() {
        let mut config = config_with("http://example.com");
        config.filters.exclude_regex = Some("(unclosed".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_validate_requires_wordlist() {
        let mut config = config_with("http://example.com");
        config.wordlists.clear();
        assert!(matches!(config.validate(), Err(ConfigError::MissingWordlist)));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(config_with("http://example.com").validate().is_ok());
    }
}
