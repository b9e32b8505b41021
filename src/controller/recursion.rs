// src/controller/recursion.rs
// =============================================================================
// The job queue of one target, and the recursion rules that feed it.
//
// A job is a base path the fuzzer runs the whole dictionary against. The
// first job is the target's own path (or the --subdirs list); every match
// that looks like a directory can add more.
//
// Paths here are relative to the host root without a leading '/', the same
// form the fuzzer requests: "", "app/", "app/backup/".
//
// Jobs are processed front to back. The front job stays in the queue until
// finish_job(), so a snapshot taken mid-job still contains it.
// =============================================================================

use super::session::JobQueueState;
use crate::config::RecursionOptions;
use crate::paths::clean_path;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;
use url::Url;

// "backup.tar.gz/" ends with something that looks like a file extension
fn extension_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+([.][a-zA-Z0-9]{2,5}){1,3}~?$").ok())
        .as_ref()
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    options: RecursionOptions,
    /// The target's own path, depth is counted from here
    root: String,
    passed: HashSet<String>,
    pending: VecDeque<String>,
    jobs_processed: usize,
    total_jobs: usize,
}

impl JobQueue {
    pub fn new(root: &str, options: RecursionOptions) -> Self {
        Self {
            options,
            root: root.to_string(),
            passed: HashSet::new(),
            pending: VecDeque::new(),
            jobs_processed: 0,
            total_jobs: 0,
        }
    }

    // First jobs: each --subdirs entry under the root, or the root itself
    pub fn seed(&mut self, subdirs: &[String]) {
        if subdirs.is_empty() {
            let root = self.root.clone();
            self.push(root);
            return;
        }
        for subdir in subdirs {
            let mut path = format!("{}{}", self.root, subdir.trim_start_matches('/'));
            if !path.is_empty() && !path.ends_with('/') {
                path.push('/');
            }
            self.push(path);
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.pending.front().map(String::as_str)
    }

    pub fn finish_job(&mut self) {
        if self.pending.pop_front().is_some() {
            self.jobs_processed += 1;
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    // Jobs queued after the current one
    pub fn waiting(&self) -> usize {
        self.pending.len().saturating_sub(1)
    }

    pub fn jobs_processed(&self) -> usize {
        self.jobs_processed
    }

    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }

    fn push(&mut self, path: String) {
        self.passed.insert(path.clone());
        self.pending.push_back(path);
        self.total_jobs += 1;
    }

    // Queues `path` as a new job unless it is excluded, too deep or already seen
    fn add_directory(&mut self, path: &str) -> bool {
        let relative = path.strip_prefix(self.root.as_str()).unwrap_or(path);
        let excluded = self.options.exclude_subdirs.iter().any(|dir| {
            let dir = dir.trim_start_matches('/');
            !dir.is_empty() && (relative.starts_with(dir) || relative.contains(&format!("/{}", dir)))
        });
        if excluded {
            return false;
        }

        let depth = relative.matches('/').count();
        if self.options.max_depth > 0 && depth > self.options.max_depth {
            return false;
        }
        if self.passed.contains(path) {
            return false;
        }

        self.push(path.to_string());
        true
    }

    // Recursion for a matched path. Returns the jobs added.
    pub fn recur(&mut self, path: &str) -> Vec<String> {
        let mut path = clean_path(path).to_string();
        if self.options.force_recursive && !path.ends_with('/') {
            path.push('/');
        }

        let mut added = Vec::new();
        if self.options.deep_recursive {
            // the last segment is a level too: "a/b/c" gives a/, a/b/, a/b/c/
            if !path.is_empty() && !path.ends_with('/') {
                path.push('/');
            }
            for (index, _) in path.match_indices('/') {
                let prefix = &path[..=index];
                if prefix.len() > self.root.len() && self.add_directory(prefix) {
                    added.push(prefix.to_string());
                }
            }
        } else if (self.options.recursive || self.options.force_recursive)
            && path.ends_with('/')
            && !looks_like_file(&path[..path.len() - 1])
        {
            if self.add_directory(&path) {
                added.push(path);
            }
        }
        added
    }

    // A redirect only leads to recursion when it points at the same path
    // with a '/' appended ("admin" -> "admin/"). `redirect` is resolved
    // against `page_url`, the URL that answered with it.
    pub fn recur_for_redirect(&mut self, path: &str, redirect: &str, page_url: &str) -> Vec<String> {
        let Some(target) = Url::parse(page_url).and_then(|url| url.join(redirect)).ok() else {
            return Vec::new();
        };
        let Ok(page) = Url::parse(page_url) else {
            return Vec::new();
        };
        if target.host_str() != page.host_str() || target.port_or_known_default() != page.port_or_known_default() {
            return Vec::new();
        }

        let redirect_path = target.path().trim_start_matches('/');
        if redirect_path == format!("{}/", clean_path(path)) {
            self.recur(redirect_path)
        } else {
            Vec::new()
        }
    }

    pub fn snapshot(&self) -> JobQueueState {
        let mut passed: Vec<String> = self.passed.iter().cloned().collect();
        passed.sort();
        JobQueueState {
            passed,
            pending: self.pending.iter().cloned().collect(),
            jobs_processed: self.jobs_processed,
            total_jobs: self.total_jobs,
        }
    }

    pub fn restore(&mut self, state: JobQueueState) {
        self.passed = state.passed.into_iter().collect();
        self.pending = state.pending.into_iter().collect();
        self.jobs_processed = state.jobs_processed;
        self.total_jobs = state.total_jobs;
    }
}

fn looks_like_file(path: &str) -> bool {
    extension_regex().map(|re| re.is_match(path)).unwrap_or(false)
}
