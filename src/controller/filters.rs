// src/controller/filters.rs
// =============================================================================
// User filters applied to a match before it is reported or recursed into.
//
// The scanner decides whether a path exists; these filters decide whether
// the user wants to hear about it. Checked in order, first hit wins:
// exclude status, include status, exclude size, min size, max size,
// exclude text, exclude regex, exclude redirect.
// =============================================================================

use crate::config::FilterOptions;
use crate::error::ConfigError;
use crate::paths::human_size;
use crate::requester::Response;
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug)]
pub struct Filters {
    include_status: HashSet<u16>,
    exclude_status: HashSet<u16>,
    exclude_sizes: Vec<String>,
    min_size: usize,
    max_size: usize,
    exclude_texts: Vec<String>,
    exclude_regex: Option<Regex>,
    exclude_redirect: Option<(String, Regex)>,
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

impl Filters {
    pub fn new(options: &FilterOptions) -> Result<Self, ConfigError> {
        let exclude_regex = options.exclude_regex.as_deref().map(compile).transpose()?;
        let exclude_redirect = match options.exclude_redirect.as_deref() {
            Some(pattern) => Some((pattern.to_string(), compile(pattern)?)),
            None => None,
        };

        Ok(Self {
            include_status: options.include_status.clone(),
            exclude_status: options.exclude_status.clone(),
            exclude_sizes: options
                .exclude_sizes
                .iter()
                .map(|size| size.trim().to_uppercase())
                .collect(),
            min_size: options.min_response_size,
            max_size: options.max_response_size,
            exclude_texts: options.exclude_texts.clone(),
            exclude_regex,
            exclude_redirect,
        })
    }

    // True when the response should be reported
    pub fn accepts(&self, response: &Response) -> bool {
        if self.exclude_status.contains(&response.status) {
            return false;
        }
        if !self.include_status.is_empty() && !self.include_status.contains(&response.status) {
            return false;
        }

        let length = response.length();
        if !self.exclude_sizes.is_empty() && self.exclude_sizes.contains(&human_size(length)) {
            return false;
        }
        if length < self.min_size {
            return false;
        }
        if self.max_size != 0 && length > self.max_size {
            return false;
        }

        if self
            .exclude_texts
            .iter()
            .any(|text| response.content.contains(text.as_str()))
        {
            return false;
        }
        if let Some(regex) = &self.exclude_regex {
            if regex.is_match(&response.content) {
                return false;
            }
        }
        if let Some((raw, regex)) = &self.exclude_redirect {
            if !response.redirect.is_empty()
                && (regex.is_match(&response.redirect) || response.redirect.contains(raw.as_str()))
            {
                return false;
            }
        }

        true
    }
}
