// src/scanner/mod.rs
// =============================================================================
// Wildcard detection.
//
// A Scanner learns what "not found" looks like for one kind of path, by
// requesting two random paths of that kind:
//   admin/__WILDCARD_POINT__      -> admin/aZ81kq, admin/Pm4Xr7
//   admin/__WILDCARD_POINT__.php  -> admin/aZ81kq.php, ...
// and then judges real responses against that baseline (check()).
//
// A ScannerSet holds every Scanner for one base path: the defaults that
// apply to all paths, plus one per prefix and one per suffix/extension.
//
// Submodules:
// - matcher: sequence matching (similarity ratio, matching blocks)
// - content: baseline-vs-page comparison for dynamic pages
// - redirect: wildcard redirect patterns
// =============================================================================

mod content;
mod matcher;
mod redirect;

pub use content::DynamicContentParser;
pub use redirect::generate_redirect_regex;

use crate::config::{DictionaryOptions, FuzzOptions};
use crate::error::RequestError;
use crate::paths::clean_path;
use crate::requester::{Requester, Response};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const WILDCARD_TEST_POINT_MARKER: &str = "__WILDCARD_POINT__";

// Always calibrated, on top of the configured prefixes/suffixes
const DEFAULT_TEST_PREFIXES: &[&str] = &["."];
const DEFAULT_TEST_SUFFIXES: &[&str] = &["/"];

const RAND_LENGTH: usize = 6;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Redirect statuses that make two calibration responses comparable by location
const WILDCARD_REDIRECT_STATUSES: &[u16] = &[301, 302, 307];

#[derive(Debug, Clone)]
pub struct Scanner {
    /// Shown in logs, e.g. "/admin/***.php"
    context: String,
    /// The first calibration request's response
    response: Response,
    redirect_regex: Option<String>,
    /// None when the first calibration request came back 404
    parser: Option<Arc<DynamicContentParser>>,
}

impl Scanner {
    // Calibrates against the server. `tested` are the scanners already set
    // up for this base path: if one of them saw the very same first
    // response, its results are reused instead of probing again.
    pub async fn setup(
        requester: &dyn Requester,
        path: &str,
        context: &str,
        delay: Duration,
        tested: &[&Scanner],
    ) -> Result<Self, RequestError> {
        let first_random = rand_string(RAND_LENGTH, "");
        let first_path = path.replace(WILDCARD_TEST_POINT_MARKER, &first_random);
        let first = requester.request(&first_path, None).await?;
        sleep(delay).await;

        let mut scanner = Self {
            context: context.to_string(),
            response: first,
            redirect_regex: None,
            parser: None,
        };

        // A 404 calibration response is taken at face value
        if scanner.response.status == 404 {
            debug!(context, "calibrated: 404 baseline");
            return Ok(scanner);
        }

        if let Some(duplicate) = tested.iter().find(|other| other.response == scanner.response) {
            debug!(context, "skipped the second calibration request, same baseline as {}", duplicate.context);
            scanner.redirect_regex = duplicate.redirect_regex.clone();
            scanner.parser = duplicate.parser.clone();
            return Ok(scanner);
        }

        let second_random = rand_string(RAND_LENGTH, &first_random);
        let second_path = path.replace(WILDCARD_TEST_POINT_MARKER, &second_random);
        let second = requester.request(&second_path, None).await?;
        sleep(delay).await;

        let first = &scanner.response;
        if is_wildcard_redirect(first) && is_wildcard_redirect(&second) {
            let regex = generate_redirect_regex(
                clean_path(&first.redirect),
                &first_path,
                clean_path(&second.redirect),
                &second_path,
            );
            debug!(context, regex = %regex, "wildcard redirect pattern");
            scanner.redirect_regex = Some(regex);
        }

        scanner.parser = Some(Arc::new(DynamicContentParser::new(
            &first.content,
            &second.content,
        )));
        info!(context, status = first.status, "calibrated wildcard baseline");

        Ok(scanner)
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    // True when `response` (for request path `path`) is a real find rather
    // than this scanner's "not found" page.
    pub fn check(&self, path: &str, response: &Response) -> bool {
        let invalid_status = self.response.status;
        if invalid_status == 404 && response.status == 404 {
            return false;
        }
        if invalid_status != response.status {
            return true;
        }

        // Query and fragment of a redirect may carry random values
        if let Some(regex) = &self.redirect_regex {
            if !response.redirect.is_empty()
                && !redirect::matches_redirect(regex, path, clean_path(&response.redirect))
            {
                return true;
            }
        }

        // Binary bodies have no decoded content: compare the bytes
        if self.response.content.is_empty() && response.content.is_empty() {
            return self.response.body != response.body;
        }

        match &self.parser {
            Some(parser) => !parser.matches(&response.content),
            None => true,
        }
    }
}

fn is_wildcard_redirect(response: &Response) -> bool {
    !response.redirect.is_empty() && WILDCARD_REDIRECT_STATUSES.contains(&response.status)
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

// Random [a-zA-Z0-9] string that shares no character with `omit`
pub fn rand_string(length: usize, omit: &str) -> String {
    let alphabet: Vec<u8> = ALPHABET
        .iter()
        .copied()
        .filter(|c| !omit.as_bytes().contains(c))
        .collect();
    let mut rng = rand::thread_rng();
    (0..length)
        .filter_map(|_| alphabet.choose(&mut rng).map(|&c| c as char))
        .collect()
}

// Every scanner for one base path
#[derive(Debug, Clone, Default)]
pub struct ScannerSet {
    defaults: Vec<Scanner>,
    prefixes: Vec<(String, Scanner)>,
    suffixes: Vec<(String, Scanner)>,
}

impl ScannerSet {
    pub async fn setup(
        requester: &dyn Requester,
        base_path: &str,
        dictionary: &DictionaryOptions,
        fuzz: &FuzzOptions,
    ) -> Result<Self, RequestError> {
        let delay = fuzz.delay;
        let mut set = ScannerSet::default();

        let index = Scanner::setup(requester, base_path, &format!("/{}", base_path), delay, &[]).await?;
        set.defaults.push(index);

        let random = Scanner::setup(
            requester,
            &format!("{}{}", base_path, WILDCARD_TEST_POINT_MARKER),
            &format!("/{}***", base_path),
            delay,
            &set.tested(),
        )
        .await?;
        set.defaults.push(random);

        if let Some(custom) = &fuzz.exclude_response {
            let scanner = Scanner::setup(
                requester,
                custom.trim_start_matches('/'),
                &format!("/{}", custom.trim_start_matches('/')),
                delay,
                &set.tested(),
            )
            .await?;
            set.defaults.push(scanner);
        }

        let prefixes = dictionary
            .prefixes
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_TEST_PREFIXES.iter().copied());
        for prefix in prefixes {
            if set.prefixes.iter().any(|(p, _)| p == prefix) {
                continue;
            }
            let scanner = Scanner::setup(
                requester,
                &format!("{}{}{}", base_path, prefix, WILDCARD_TEST_POINT_MARKER),
                &format!("/{}{}***", base_path, prefix),
                delay,
                &set.tested(),
            )
            .await?;
            set.prefixes.push((prefix.to_string(), scanner));
        }

        let extensions: Vec<String> = dictionary
            .extensions
            .iter()
            .map(|extension| format!(".{}", extension))
            .collect();
        let suffixes = dictionary
            .suffixes
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_TEST_SUFFIXES.iter().copied())
            .chain(extensions.iter().map(String::as_str));
        for suffix in suffixes {
            if set.suffixes.iter().any(|(s, _)| s == suffix) {
                continue;
            }
            let scanner = Scanner::setup(
                requester,
                &format!("{}{}{}", base_path, WILDCARD_TEST_POINT_MARKER, suffix),
                &format!("/{}***{}", base_path, suffix),
                delay,
                &set.tested(),
            )
            .await?;
            set.suffixes.push((suffix.to_string(), scanner));
        }

        Ok(set)
    }

    fn tested(&self) -> Vec<&Scanner> {
        self.defaults
            .iter()
            .chain(self.prefixes.iter().map(|(_, s)| s))
            .chain(self.suffixes.iter().map(|(_, s)| s))
            .collect()
    }

    // The scanners that judge `path` (a path relative to the base path):
    // matching prefixes, matching suffixes, then the defaults.
    pub fn scanners_for(&self, path: &str) -> Vec<&Scanner> {
        let path = clean_path(path);
        let mut scanners = Vec::new();
        for (prefix, scanner) in &self.prefixes {
            if path.starts_with(prefix.as_str()) {
                scanners.push(scanner);
            }
        }
        for (suffix, scanner) in &self.suffixes {
            if path.ends_with(suffix.as_str()) {
                scanners.push(scanner);
            }
        }
        scanners.extend(self.defaults.iter());
        scanners
    }

    pub fn len(&self) -> usize {
        self.defaults.len() + self.prefixes.len() + self.suffixes.len()
    }

    // Judges a response with every applicable scanner: a find only if none
    // of them recognizes it as its "not found" page.
    pub fn is_found(&self, relative: &str, full_path: &str, response: &Response) -> bool {
        self.scanners_for(relative)
            .iter()
            .all(|scanner| scanner.check(full_path, response))
    }
}
