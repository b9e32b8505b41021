// src/output.rs
// =============================================================================
// Everything the user sees while a scan runs.
//
// - result lines:  [14:02:11] 200 -    4KB - /admin/  ->  /login (Added to queue)
// - error lines:   [14:02:12] ERROR - /backup - Request timeout: http://...
// - a progress line on stderr, redrawn in place when stderr is a terminal
// - at the end: a summary, or with --json the found entries as a JSON array
//
// In --json mode stdout carries only the final JSON, so every other line
// goes to stderr instead.
// =============================================================================

use crate::config::OutputOptions;
use crate::error::RequestError;
use crate::paths::human_size;
use crate::requester::Response;
use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

// One found path, as it appears in the JSON report
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FoundEntry {
    pub url: String,
    pub path: String,
    pub status: u16,
    pub content_length: usize,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

// What the progress line shows
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub rate: usize,
    pub job: usize,
    pub jobs: usize,
    pub errors: usize,
}

pub struct Output {
    json: bool,
    quiet: bool,
    interactive: bool,
    progress_drawn: AtomicBool,
    found: Mutex<Vec<FoundEntry>>,
}

fn now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

// The line printed for a match
pub fn format_result(time: &str, path: &str, response: &Response, added_to_queue: bool) -> String {
    let mut line = format!(
        "[{}] {} - {:>6} - /{}",
        time,
        response.status,
        human_size(response.length()),
        path
    );
    if !response.redirect.is_empty() {
        line.push_str(&format!("  ->  {}", response.redirect));
    } else if let Some(last) = response.history.last() {
        // followed redirects: show where we came from
        line.push_str(&format!("  <-  {}", last));
    }
    if added_to_queue {
        line.push_str("     (Added to queue)");
    }
    line
}

impl Output {
    pub fn new(options: &OutputOptions) -> Self {
        Self {
            json: options.json,
            quiet: options.quiet,
            interactive: !options.quiet && io::stderr().is_terminal(),
            progress_drawn: AtomicBool::new(false),
            found: Mutex::new(Vec::new()),
        }
    }

    // Writes one line to stdout (stderr in --json mode), erasing the
    // progress line first if it is on screen
    fn line(&self, text: &str) -> Result<()> {
        self.clear_progress();
        if self.json {
            writeln!(io::stderr().lock(), "{}", text)?;
        } else {
            writeln!(io::stdout().lock(), "{}", text)?;
        }
        Ok(())
    }

    pub fn target(&self, url: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.line("")?;
        self.line(&format!("Target: {}", url))
    }

    pub fn job(&self, base_path: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.line(&format!("[{}] Starting: /{}", now(), base_path))
    }

    pub fn found(&self, path: &str, response: &Response, added_to_queue: bool) -> Result<()> {
        self.found.lock().push(FoundEntry {
            url: response.url.clone(),
            path: format!("/{}", path),
            status: response.status,
            content_length: response.length(),
            content_type: response.content_type().to_string(),
            redirect: (!response.redirect.is_empty()).then(|| response.redirect.clone()),
        });

        if self.json {
            return Ok(());
        }
        self.line(&format_result(&now(), path, response, added_to_queue))
    }

    pub fn error(&self, path: &str, error: &RequestError) {
        if self.quiet {
            return;
        }
        self.clear_progress();
        eprintln!("[{}] ERROR - /{} - {}", now(), path, error);
    }

    pub fn warning(&self, message: &str) {
        self.clear_progress();
        eprintln!("{}", message);
    }

    pub fn progress(&self, progress: Progress) {
        if !self.interactive {
            return;
        }
        let percent = if progress.total == 0 {
            100
        } else {
            progress.index * 100 / progress.total
        };
        let mut stderr = io::stderr().lock();
        let _ = write!(
            stderr,
            "\r\x1b[K{}% {}/{}  {}/s  job:{}/{}  errors:{}",
            percent,
            progress.index,
            progress.total,
            progress.rate,
            progress.job,
            progress.jobs,
            progress.errors
        );
        let _ = stderr.flush();
        self.progress_drawn.store(true, Ordering::SeqCst);
    }

    pub fn clear_progress(&self) {
        if self.progress_drawn.swap(false, Ordering::SeqCst) {
            let _ = write!(io::stderr().lock(), "\r\x1b[K");
        }
    }

    pub fn found_entries(&self) -> Vec<FoundEntry> {
        self.found.lock().clone()
    }

    // Summary, or the JSON report
    pub fn finish(&self) -> Result<()> {
        self.clear_progress();
        let found = self.found_entries();
        if self.json {
            let report = serde_json::to_string_pretty(&found)?;
            writeln!(io::stdout().lock(), "{}", report)?;
        } else if !self.quiet {
            self.line("")?;
            self.line(&format!("Task completed, {} path(s) found", found.len()))?;
        }
        Ok(())
    }
}
