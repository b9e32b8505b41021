// src/crawl/links.rs
// =============================================================================
// Extracts new paths to try from a response we already matched.
//
// Three sources, picked by what the response is:
// - HTML (content-type text/html): every link-carrying attribute, parsed
//   with scraper and resolved against the page URL
// - robots.txt: the paths of Allow/Disallow rules
// - anything else: absolute http(s) URLs found in the text
//
// Only links inside the scope (target URL + current base path) are kept,
// and they are returned relative to that scope, without query or fragment.
// =============================================================================

use crate::paths::clean_path;
use crate::requester::Response;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

// (selector, attribute) pairs that carry a URL
const LINK_ATTRIBUTES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("area[href]", "href"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("iframe[src]", "src"),
    ("frame[src]", "src"),
    ("embed[src]", "src"),
    ("source[src]", "src"),
    ("form[action]", "action"),
    ("button[formaction]", "formaction"),
    ("input[formaction]", "formaction"),
];

fn robots_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(?:allow|disallow)\s*:\s*/(\S*)").ok())
        .as_ref()
}

fn uri_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s'"<>()]+"#).ok())
        .as_ref()
}

// `scope` is the absolute URL of the current base path, ending with '/'
pub fn crawl(response: &Response, scope: &str) -> Vec<String> {
    let Ok(scope) = Url::parse(scope) else {
        return Vec::new();
    };

    let links = if response.content_type().contains("text/html") {
        html_links(&response.content, &response.url)
    } else if response.path.ends_with("robots.txt") {
        robots_links(&response.content, &response.url)
    } else {
        text_links(&response.content)
    };

    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter_map(|link| relative_to_scope(&link, &scope))
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

fn html_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for (selector, attribute) in LINK_ATTRIBUTES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(link) = element.value().attr(attribute).and_then(|v| resolve_link(&base, v)) {
                links.push(link);
            }
        }
    }

    links
}

fn robots_links(content: &str, page_url: &str) -> Vec<String> {
    let (Some(regex), Ok(base)) = (robots_regex(), Url::parse(page_url)) else {
        return Vec::new();
    };
    regex
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|path| path.as_str().trim_end_matches(['*', '$']))
        .filter_map(|path| resolve_link(&base, &format!("/{}", path)))
        .collect()
}

fn text_links(content: &str) -> Vec<String> {
    let Some(regex) = uri_regex() else {
        return Vec::new();
    };
    regex
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

// Resolves a link (possibly relative) to an absolute URL
fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
        || href.starts_with("data:")
    {
        return None;
    }

    base.join(href).ok().map(|url| url.to_string())
}

// "http://x/app/admin/?q=1" in scope "http://x/app/" -> "admin/"
fn relative_to_scope(link: &str, scope: &Url) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if url.scheme() != scope.scheme()
        || url.host_str() != scope.host_str()
        || url.port_or_known_default() != scope.port_or_known_default()
    {
        return None;
    }

    let path = url.path().strip_prefix(scope.path())?;
    let path = clean_path(path);
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}
