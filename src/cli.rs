// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Every flag lands in the Cli struct below; into_config() then turns it into
// the Config the rest of the program works with (splitting "Name: value"
// headers, reading the -l targets file, picking the casing rule...).
//
// Rust concepts:
// - Derive macros: #[derive(Parser)] generates the whole parser
// - Custom value parsers: functions from &str to Result<T, String> that clap
//   calls for flags like --include-status 200-299,401
// =============================================================================

use crate::config::{
    AuthConfig, AuthScheme, CaseRule, Config, ControlOptions, DictionaryOptions, FilterOptions,
    FuzzOptions, OutputOptions, RecursionOptions, RequestOptions, DEFAULT_MAX_RESPONSE_SIZE,
    DEFAULT_MAX_RETRIES, DEFAULT_THREADS,
};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "dirhound",
    version,
    about = "A web path scanner: finds hidden files and directories on web servers",
    long_about = "dirhound requests every path of a wordlist against one or more targets, \
                  tells real pages apart from catch-all \"not found\" pages, and can recurse \
                  into the directories it finds."
)]
pub struct Cli {
    /// Target URL, can be repeated
    #[arg(short = 'u', long = "url")]
    pub urls: Vec<String>,

    /// File with one target URL per line
    #[arg(short = 'l', long = "urls-file")]
    pub urls_file: Option<PathBuf>,

    /// Wordlist files, comma-separated
    #[arg(short = 'w', long = "wordlists", value_delimiter = ',')]
    pub wordlists: Vec<PathBuf>,

    // ---- dictionary ----
    /// Extensions replacing %EXT%, comma-separated (e.g. php,asp)
    #[arg(short = 'e', long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Add the extensions to every entry, not only %EXT% ones
    #[arg(short = 'f', long)]
    pub force_extensions: bool,

    /// Drop entries whose extension is not one of --extensions
    #[arg(short = 'O', long)]
    pub only_selected: bool,

    /// Cut the extension off every wordlist line
    #[arg(long)]
    pub remove_extensions: bool,

    /// Skip entries with these extensions, comma-separated
    #[arg(short = 'X', long, value_delimiter = ',')]
    pub exclude_extensions: Vec<String>,

    /// Prefixes added to entries, comma-separated (e.g. .,_)
    #[arg(long, value_delimiter = ',')]
    pub prefixes: Vec<String>,

    /// Suffixes added to entries, comma-separated (e.g. ~,.bak)
    #[arg(long, value_delimiter = ',')]
    pub suffixes: Vec<String>,

    #[arg(short = 'U', long, conflicts_with_all = ["lowercase", "capital"])]
    pub uppercase: bool,

    #[arg(short = 'L', long, conflicts_with = "capital")]
    pub lowercase: bool,

    /// Capitalize the first letter of every entry
    #[arg(short = 'C', long)]
    pub capital: bool,

    // ---- fuzzing ----
    /// Number of concurrent workers
    #[arg(short = 't', long, default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// Seconds between two requests of one worker
    #[arg(long, value_parser = parse_seconds)]
    pub delay: Option<Duration>,

    /// Max requests per second, 0 = unlimited
    #[arg(long, default_value_t = 0)]
    pub max_rate: usize,

    /// Path whose response counts as "not found" too
    #[arg(long)]
    pub exclude_response: Option<String>,

    /// Also scan paths linked from the pages found
    #[arg(long)]
    pub crawl: bool,

    // ---- recursion ----
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Recurse into every directory level of a match (a/b/c -> a/, a/b/, a/b/c/)
    #[arg(long)]
    pub deep_recursive: bool,

    /// Recurse into every match, not only directories
    #[arg(long)]
    pub force_recursive: bool,

    /// 0 = unlimited
    #[arg(short = 'R', long = "max-recursion-depth", default_value_t = 0)]
    pub max_recursion_depth: usize,

    /// Status codes that allow recursion (e.g. 200-399)
    #[arg(long, value_parser = parse_status_codes)]
    pub recursion_status: Option<HashSet<u16>>,

    /// Subdirectories never recursed into, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub exclude_subdirs: Vec<String>,

    /// Start from these subdirectories instead of the target path, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub subdirs: Vec<String>,

    // ---- filters ----
    /// Only report these status codes (e.g. 200,300-399)
    #[arg(short = 'i', long, value_parser = parse_status_codes)]
    pub include_status: Option<HashSet<u16>>,

    /// Never report these status codes
    #[arg(short = 'x', long, value_parser = parse_status_codes)]
    pub exclude_status: Option<HashSet<u16>>,

    /// Hide responses of these sizes, comma-separated (e.g. 0B,4KB)
    #[arg(long, value_delimiter = ',')]
    pub exclude_sizes: Vec<String>,

    #[arg(long, default_value_t = 0)]
    pub min_response_size: usize,

    /// 0 = no limit
    #[arg(long, default_value_t = 0)]
    pub max_response_size: usize,

    /// Hide responses containing this text, can be repeated
    #[arg(long)]
    pub exclude_text: Vec<String>,

    /// Hide responses whose body matches this regex
    #[arg(long)]
    pub exclude_regex: Option<String>,

    /// Hide redirects to locations matching this regex or text
    #[arg(long)]
    pub exclude_redirect: Option<String>,

    // ---- requests ----
    #[arg(short = 'm', long = "http-method", default_value = "GET")]
    pub method: String,

    /// Request body
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// "Name: value", can be repeated
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// A random browser user agent per request
    #[arg(long)]
    pub random_agent: bool,

    #[arg(long)]
    pub cookie: Option<String>,

    /// "user:password", or the token for bearer
    #[arg(long, requires = "auth_type")]
    pub auth: Option<String>,

    #[arg(long, value_enum, requires = "auth")]
    pub auth_type: Option<AuthType>,

    #[arg(short = 'F', long)]
    pub follow_redirects: bool,

    /// Seconds per request
    #[arg(long, value_parser = parse_seconds)]
    pub timeout: Option<Duration>,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Proxy URL (http, https or socks5), can be repeated
    #[arg(short = 'p', long = "proxy")]
    pub proxies: Vec<String>,

    /// Connect to this address instead of resolving the target host
    #[arg(long)]
    pub ip: Option<IpAddr>,

    /// Bytes of a response body read at most
    #[arg(long, default_value_t = DEFAULT_MAX_RESPONSE_SIZE)]
    pub max_body_size: usize,

    // ---- control ----
    /// Seconds before the whole scan is stopped
    #[arg(long, value_parser = parse_seconds)]
    pub max_time: Option<Duration>,

    /// Seconds before a target is skipped
    #[arg(long, value_parser = parse_seconds)]
    pub target_max_time: Option<Duration>,

    /// Stop at the first request error
    #[arg(long)]
    pub exit_on_error: bool,

    /// Skip the target when one of these status codes shows up
    #[arg(long, value_parser = parse_status_codes)]
    pub skip_on_status: Option<HashSet<u16>>,

    // ---- output ----
    /// Print the found paths as JSON at the end
    #[arg(long)]
    pub json: bool,

    /// Results only, no banners or errors
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// error, warn, info, debug or trace (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    Basic,
    Digest,
    Bearer,
    Ntlm,
}

impl From<AuthType> for AuthScheme {
    fn from(value: AuthType) -> Self {
        match value {
            AuthType::Basic => AuthScheme::Basic,
            AuthType::Digest => AuthScheme::Digest,
            AuthType::Bearer => AuthScheme::Bearer,
            AuthType::Ntlm => AuthScheme::Ntlm,
        }
    }
}

// "200,300-399" -> {200, 300, ..., 399}
fn parse_status_codes(value: &str) -> Result<HashSet<u16>, String> {
    let mut codes = HashSet::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |code: &str| {
            code.trim()
                .parse::<u16>()
                .map_err(|_| format!("invalid status code '{}'", code))
        };
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if start > end {
                    return Err(format!("invalid status code range '{}'", part));
                }
                codes.extend(start..=end);
            }
            None => {
                codes.insert(parse(part)?);
            }
        }
    }
    Ok(codes)
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("invalid number of seconds '{}'", value))
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn clean_extensions(values: Vec<String>) -> Vec<String> {
    clean_list(values)
        .into_iter()
        .map(|v| v.trim_start_matches('.').to_string())
        .collect()
}

impl Cli {
    // Turns the parsed flags into a Config. Validation comes after, in
    // Config::validate().
    pub fn into_config(self) -> Result<Config> {
        let mut targets = clean_list(self.urls);
        if let Some(path) = &self.urls_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read targets from '{}'", path.display()))?;
            targets.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string),
            );
        }

        let headers = self
            .headers
            .iter()
            .map(|header| {
                header
                    .split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .filter(|(name, _)| !name.is_empty())
                    .ok_or_else(|| ConfigError::InvalidHeader {
                        header: header.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let case = if self.uppercase {
            CaseRule::Uppercase
        } else if self.lowercase {
            CaseRule::Lowercase
        } else if self.capital {
            CaseRule::Capitalize
        } else {
            CaseRule::Preserve
        };

        let auth = match (self.auth, self.auth_type) {
            (Some(credential), Some(scheme)) => Some(AuthConfig {
                scheme: scheme.into(),
                credential,
            }),
            _ => None,
        };

        let request_defaults = RequestOptions::default();
        let recursion_defaults = RecursionOptions::default();

        Ok(Config {
            targets,
            wordlists: self.wordlists,
            dictionary: DictionaryOptions {
                extensions: clean_extensions(self.extensions),
                exclude_extensions: clean_extensions(self.exclude_extensions),
                prefixes: clean_list(self.prefixes),
                suffixes: clean_list(self.suffixes),
                force_extensions: self.force_extensions,
                only_selected: self.only_selected,
                no_extension: self.remove_extensions,
                case,
            },
            request: RequestOptions {
                method: self.method,
                headers,
                data: self.data,
                timeout: self.timeout.unwrap_or(request_defaults.timeout),
                max_retries: self.max_retries,
                follow_redirects: self.follow_redirects,
                random_agents: self.random_agent,
                user_agent: self.user_agent,
                cookie: self.cookie,
                auth,
                proxies: clean_list(self.proxies),
                ip: self.ip,
                max_response_size: self.max_body_size,
            },
            fuzz: FuzzOptions {
                threads: self.threads,
                delay: self.delay.unwrap_or(Duration::ZERO),
                max_rate: self.max_rate,
                exclude_response: self.exclude_response,
                crawl: self.crawl,
            },
            recursion: RecursionOptions {
                recursive: self.recursive,
                deep_recursive: self.deep_recursive,
                force_recursive: self.force_recursive,
                max_depth: self.max_recursion_depth,
                status_codes: self.recursion_status.unwrap_or(recursion_defaults.status_codes),
                exclude_subdirs: clean_list(self.exclude_subdirs),
                subdirs: clean_list(self.subdirs),
            },
            filters: FilterOptions {
                include_status: self.include_status.unwrap_or_default(),
                exclude_status: self.exclude_status.unwrap_or_default(),
                exclude_sizes: clean_list(self.exclude_sizes),
                min_response_size: self.min_response_size,
                max_response_size: self.max_response_size,
                exclude_texts: self.exclude_text,
                exclude_regex: self.exclude_regex,
                exclude_redirect: self.exclude_redirect,
            },
            control: ControlOptions {
                max_time: self.max_time,
                target_max_time: self.target_max_time,
                exit_on_error: self.exit_on_error,
                skip_on_status: self.skip_on_status.unwrap_or_default(),
            },
            output: OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        })
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why is Option<HashSet<u16>> used for status flags?
//    - clap treats Option<T> as "flag may be absent"
//    - the value_parser builds the HashSet from the raw string
//
// 2. value_delimiter = ','
//    - "-e php,asp" and "-e php -e asp" both give vec!["php", "asp"]
//
// 3. into_config(self) takes ownership
//    - the Strings and Vecs move into the Config, nothing is cloned
// -----------------------------------------------------------------------------
