// src/scanner/redirect.rs
// =============================================================================
// Wildcard redirect patterns.
//
// When two random calibration requests both redirect, e.g.
//   /aZ81kq -> /auth/aZ81kq/1696
//   /Pm4Xr7 -> /auth/Pm4Xr7/1701
// the server redirects everything. We turn the pair into a regex:
// the requested path is replaced by a placeholder in each location, and the
// longest common prefix/suffix of the two become the literal parts:
//   ^/auth/__REFLECTED_PATH__/.*$
// At check time the placeholder is replaced by the escaped request path.
// =============================================================================

use crate::paths::{clean_path, unquote};
use regex::RegexBuilder;

pub const REFLECTED_PATH_MARKER: &str = "__REFLECTED_PATH__";

pub fn generate_redirect_regex(
    first_location: &str,
    first_path: &str,
    second_location: &str,
    second_path: &str,
) -> String {
    let first = reflect(first_location, first_path);
    let second = reflect(second_location, second_path);
    generate_matching_regex(&first, &second)
}

fn reflect(location: &str, path: &str) -> String {
    let location = unquote(location);
    if path.is_empty() {
        location
    } else {
        location.replace(path, REFLECTED_PATH_MARKER)
    }
}

// Escaped common prefix, ".*" where the strings diverge, then the escaped
// common suffix. Two strings that never diverge give an exact pattern.
pub fn generate_matching_regex(first: &str, second: &str) -> String {
    let mut start = String::from("^");
    let mut diverged = false;
    for (a, b) in first.chars().zip(second.chars()) {
        if a != b {
            start.push_str(".*");
            diverged = true;
            break;
        }
        start.push_str(&regex::escape(a.encode_utf8(&mut [0; 4])));
    }

    let mut end = String::from("$");
    if diverged {
        for (a, b) in first.chars().rev().zip(second.chars().rev()) {
            if a != b {
                break;
            }
            end.insert_str(0, &regex::escape(a.encode_utf8(&mut [0; 4])));
        }
    }

    start + &end
}

// Whether `redirect`, the location a request for `path` returned, follows
// the wildcard pattern. Both sides are compared percent-decoded, ignoring
// case. The query and fragment of `path` never show up in the pattern.
pub fn matches_redirect(pattern: &str, path: &str, redirect: &str) -> bool {
    let reflected = regex::escape(&unquote(clean_path(path)));
    let pattern = pattern.replace(REFLECTED_PATH_MARKER, &reflected);
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => regex.is_match(&unquote(redirect)),
        Err(_) => false,
    }
}
