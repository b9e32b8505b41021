// src/fuzzer/callbacks.rs
// =============================================================================
// How the fuzzer reports results, and how listeners steer it back.
//
// Every request ends in exactly one of:
// - match:     the path exists (passed every wildcard check)
// - not found: some scanner recognized its "not found" page
// - error:     the request failed after all retries
//
// Match and error listeners answer with a ScanOutcome. Anything other than
// Continue stops the current run; the controller then reads the outcome to
// decide between skipping the target and ending the whole scan.
// =============================================================================

use crate::error::RequestError;
use crate::requester::Response;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Continue,
    /// Give up on the current target, move on to the next one
    SkipTarget(String),
    /// Stop scanning altogether
    Stop(String),
}

impl ScanOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, ScanOutcome::Continue)
    }
}

/// Called with the request path and its response. An Err is kept by the
/// fuzzer and raised from `wait()`.
pub type MatchCallback = Box<dyn Fn(&str, &Response) -> anyhow::Result<ScanOutcome> + Send + Sync>;
pub type NotFoundCallback = Box<dyn Fn(&str, &Response) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&str, &RequestError) -> ScanOutcome + Send + Sync>;

#[derive(Default)]
pub struct Callbacks {
    pub(super) on_match: Vec<MatchCallback>,
    pub(super) on_not_found: Vec<NotFoundCallback>,
    pub(super) on_error: Vec<ErrorCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_match(
        mut self,
        callback: impl Fn(&str, &Response) -> anyhow::Result<ScanOutcome> + Send + Sync + 'static,
    ) -> Self {
        self.on_match.push(Box::new(callback));
        self
    }

    pub fn on_not_found(mut self, callback: impl Fn(&str, &Response) + Send + Sync + 'static) -> Self {
        self.on_not_found.push(Box::new(callback));
        self
    }

    pub fn on_error(
        mut self,
        callback: impl Fn(&str, &RequestError) -> ScanOutcome + Send + Sync + 'static,
    ) -> Self {
        self.on_error.push(Box::new(callback));
        self
    }
}
