// src/dictionary/generate.rs
// =============================================================================
// Turns raw wordlist lines into the ordered list of paths we will request.
//
// How it works, per line (in file order):
// 1. Trim it, skip blanks and "#" comments, drop one leading "/"
// 2. Optionally cut the extension off ("admin.php" -> "admin")
// 3. Skip the line if it mentions an excluded extension
// 4. Expand it:
//    - "%EXT%" anywhere in the line -> one entry per configured extension
//    - forced extensions on a non-directory -> "x.ext" for each extension,
//      then "x/"
//    - otherwise the line as-is
// 5. Percent-escape every entry
//
// Then the whole list is filtered (only-selected extensions), re-cased,
// and deduplicated keeping the first occurrence.
// =============================================================================

use crate::config::{CaseRule, DictionaryOptions};
use crate::paths::{clean_path, safe_quote};
use std::collections::HashSet;

pub const EXTENSION_TAG: &str = "%ext%";

pub fn build(lines: &[String], options: &DictionaryOptions) -> Vec<String> {
    let mut entries = Vec::new();

    for raw in lines {
        let Some(line) = normalize_line(raw, options) else {
            continue;
        };

        if has_extension_tag(&line) {
            for extension in &options.extensions {
                entries.push(replace_extension_tag(&line, extension));
            }
        } else if options.force_extensions && !line.ends_with('/') {
            for extension in &options.extensions {
                entries.push(format!("{}.{}", line, extension));
            }
            entries.push(format!("{}/", line));
        } else {
            entries.push(line);
        }
    }

    let entries = entries.iter().map(|entry| safe_quote(entry));

    let entries: Vec<String> = if options.only_selected {
        entries
            .filter(|entry| {
                let extension = entry_extension(entry);
                extension.is_empty() || options.extensions.iter().any(|e| e == extension)
            })
            .collect()
    } else {
        entries.collect()
    };

    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|entry| apply_case(&entry, options.case))
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

// Returns None for lines that produce no entry at all
fn normalize_line(raw: &str, options: &DictionaryOptions) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut line = line.strip_prefix('/').unwrap_or(line);

    if options.no_extension {
        line = line.split('.').next().unwrap_or_default();
    }
    if line.is_empty() {
        return None;
    }

    if options
        .exclude_extensions
        .iter()
        .any(|extension| line.contains(&format!(".{}", extension)))
    {
        return None;
    }

    Some(line.to_string())
}

fn has_extension_tag(line: &str) -> bool {
    line.to_ascii_lowercase().contains(EXTENSION_TAG)
}

// Case-insensitive replace of every %EXT%. The tag is ASCII, so byte
// offsets in the lowercased copy line up with the original.
fn replace_extension_tag(line: &str, extension: &str) -> String {
    let lower = line.to_ascii_lowercase();
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for (index, _) in lower.match_indices(EXTENSION_TAG) {
        out.push_str(&line[last..index]);
        out.push_str(extension);
        last = index + EXTENSION_TAG.len();
    }
    out.push_str(&line[last..]);
    out
}

// "admin/login.php?x=1" -> "php", "backup/" -> "", ".htaccess" -> ""
pub fn entry_extension(entry: &str) -> &str {
    let path = clean_path(entry);
    if path.ends_with('/') {
        return "";
    }
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => extension,
        _ => "",
    }
}

fn apply_case(entry: &str, case: CaseRule) -> String {
    match case {
        CaseRule::Preserve => entry.to_string(),
        CaseRule::Lowercase => entry.to_lowercase(),
        CaseRule::Uppercase => entry.to_uppercase(),
        CaseRule::Capitalize => {
            let mut chars = entry.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        }
    }
}
