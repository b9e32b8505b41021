// src/crawl/mod.rs
// =============================================================================
// Link discovery for --crawl.
//
// When a path matches, its response may point at other paths nobody put in
// the wordlist (links in a page, rules in robots.txt, URLs in a script).
// The fuzzer scans those too, with the same wildcard checks.
//
// Only links under the current base path are followed, so crawling never
// leaves the directory being scanned.
// =============================================================================

mod links;

pub use links::crawl;
