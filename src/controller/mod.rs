// src/controller/mod.rs
// =============================================================================
// Drives a whole scan: targets one after another, and for each target its
// jobs one after another, each job being one fuzzer run.
//
//   for each target:
//     connectivity check (one request to the target path)
//     for each job in the queue:
//       fuzzer.start(job) -> poll every 250ms until it is done:
//         - progress line
//         - --max-time / --target-max-time
//         - Ctrl-C: pause and ask [q]uit / [c]ontinue / [n]ext
//
// The fuzzer reports through callbacks built here (match, not found, error).
// They share a TargetContext with the loop: the job queue, the filters, the
// output and the error counters.
//
// Submodules:
// - filters:   user filters on matches
// - recursion: the job queue and the recursion rules
// - session:   checkpoint structs
// =============================================================================

mod filters;
mod recursion;
mod session;

pub use filters::Filters;
pub use recursion::JobQueue;
pub use session::SessionState;

use crate::config::{Config, Target};
use crate::dictionary::Dictionary;
use crate::error::RequestError;
use crate::fuzzer::{Callbacks, Fuzzer, FuzzerState, ScanOutcome};
use crate::output::{FoundEntry, Output, Progress};
use crate::requester::{DnsCache, HttpRequester, Requester, Response};
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const MAX_CONSECUTIVE_ERRORS: usize = 75;

// How a whole run ended. Maps to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    Aborted,
}

// How one target ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEnd {
    Done,
    Skipped(String),
    Quit(String),
}

// How one job ended
enum JobEnd {
    Finished,
    /// Ctrl-C "next" while more jobs are queued
    Skipped,
    Target(TargetEnd),
}

enum Choice {
    Quit,
    Continue,
    Next,
}

// State shared between the controller loop and the fuzzer callbacks
struct TargetContext {
    config: Arc<Config>,
    output: Arc<Output>,
    filters: Arc<Filters>,
    queue: Mutex<JobQueue>,
    errors: AtomicUsize,
    consecutive_errors: AtomicUsize,
}

impl TargetContext {
    fn on_match(&self, path: &str, response: &Response) -> Result<ScanOutcome> {
        self.consecutive_errors.store(0, Ordering::SeqCst);

        if self.config.control.skip_on_status.contains(&response.status) {
            return Ok(ScanOutcome::SkipTarget(format!(
                "Skipped the target due to {} status code",
                response.status
            )));
        }
        if !self.filters.accepts(response) {
            debug!("Filtered out /{} ({})", path, response.status);
            return Ok(ScanOutcome::Continue);
        }

        let added = self.recur(path, response);
        for job in &added {
            info!("Queued /{}", job);
        }
        self.output.found(path, response, !added.is_empty())?;
        Ok(ScanOutcome::Continue)
    }

    fn on_not_found(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    fn on_error(&self, path: &str, error: &RequestError) -> ScanOutcome {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let consecutive = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        self.output.error(path, error);

        if self.config.control.exit_on_error {
            ScanOutcome::Stop("Canceled due to an error".to_string())
        } else if consecutive > MAX_CONSECUTIVE_ERRORS {
            ScanOutcome::SkipTarget("Too many request errors".to_string())
        } else {
            ScanOutcome::Continue
        }
    }

    fn recur(&self, path: &str, response: &Response) -> Vec<String> {
        let recursion = &self.config.recursion;
        if !recursion.enabled() || !recursion.status_codes.contains(&response.status) {
            return Vec::new();
        }

        let mut queue = self.queue.lock();
        if !response.redirect.is_empty() {
            queue.recur_for_redirect(path, &response.redirect, &response.url)
        } else if let Some(first) = response.history.first() {
            // redirects were followed: the final URL plays the redirect
            queue.recur_for_redirect(path, &response.url, first)
        } else {
            queue.recur(path)
        }
    }

    fn callbacks(self: &Arc<Self>) -> Callbacks {
        let on_match = self.clone();
        let on_not_found = self.clone();
        let on_error = self.clone();
        Callbacks::new()
            .on_match(move |path, response| on_match.on_match(path, response))
            .on_not_found(move |_, _| on_not_found.on_not_found())
            .on_error(move |path, error| on_error.on_error(path, error))
    }
}

pub struct Controller {
    config: Arc<Config>,
    dictionary: Arc<Dictionary>,
    output: Arc<Output>,
    filters: Arc<Filters>,
    dns: DnsCache,
    /// The current target first
    targets: VecDeque<String>,
    resume: Option<SessionState>,
    current: Option<Arc<TargetContext>>,
    interrupts: Option<mpsc::UnboundedReceiver<()>>,
    started: Instant,
}

impl Controller {
    pub fn new(config: Arc<Config>, dictionary: Arc<Dictionary>) -> Result<Self> {
        let filters = Filters::new(&config.filters)?;
        Ok(Self {
            output: Arc::new(Output::new(&config.output)),
            targets: config.targets.iter().cloned().collect(),
            filters: Arc::new(filters),
            dns: DnsCache::new(),
            resume: None,
            current: None,
            interrupts: None,
            started: Instant::now(),
            config,
            dictionary,
        })
    }

    // Ctrl-C presses are queued here and handled by the polling loop
    pub fn listen_for_interrupts(&mut self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if sender.send(()).is_err() {
                    break;
                }
            }
        });
        self.interrupts = Some(receiver);
    }

    pub async fn run(&mut self) -> Result<ScanStatus> {
        self.started = Instant::now();

        while let Some(raw) = self.targets.front().cloned() {
            let target = Target::parse(&raw)?;
            self.output.target(&target.url())?;
            info!("Scanning {}", target.url());

            let requester = HttpRequester::new(&self.config.request, &target, &self.dns).await?;
            let end = self.scan_with(Arc::new(requester), &target).await?;

            match end {
                TargetEnd::Done => {}
                TargetEnd::Skipped(reason) => {
                    warn!("{}: {}", target.url(), reason);
                    self.output.warning(&reason);
                }
                TargetEnd::Quit(reason) => {
                    warn!("{}", reason);
                    self.output.warning(&reason);
                    if let Some(state) = self.snapshot() {
                        info!("Session state: {}", serde_json::to_string(&state)?);
                    }
                    self.output.finish()?;
                    return Ok(ScanStatus::Aborted);
                }
            }
            self.targets.pop_front();
        }

        self.output.finish()?;
        Ok(ScanStatus::Completed)
    }

    // Scans one target through `requester`, every job in its queue
    pub async fn scan_with(&mut self, requester: Arc<dyn Requester>, target: &Target) -> Result<TargetEnd> {
        let target_started = Instant::now();

        if let Err(error) = requester.request(&target.path, None).await {
            return Ok(TargetEnd::Skipped(error.to_string()));
        }

        self.dictionary.reset();
        let mut queue = JobQueue::new(&target.path, self.config.recursion.clone());
        match self.resume.take() {
            Some(state) => {
                info!("Resuming at job {}", state.queue.jobs_processed + 1);
                queue.restore(state.queue);
                self.dictionary.set_index(state.dictionary_index);
            }
            None => queue.seed(&self.config.recursion.subdirs),
        }

        let context = Arc::new(TargetContext {
            config: self.config.clone(),
            output: self.output.clone(),
            filters: self.filters.clone(),
            queue: Mutex::new(queue),
            errors: AtomicUsize::new(0),
            consecutive_errors: AtomicUsize::new(0),
        });
        self.current = Some(context.clone());

        let fuzzer = Fuzzer::new(
            requester,
            self.dictionary.clone(),
            self.config.clone(),
            context.callbacks(),
        );

        loop {
            let job = context.queue.lock().current().map(str::to_string);
            let Some(job) = job else {
                break;
            };

            self.output.job(&job)?;
            info!("Starting job /{}", job);
            fuzzer.set_base_path(&job);
            if let Err(error) = fuzzer.start().await {
                return Ok(TargetEnd::Skipped(error.to_string()));
            }

            match self.process(&fuzzer, &context, target_started).await? {
                JobEnd::Finished | JobEnd::Skipped => {}
                JobEnd::Target(end) => return Ok(end),
            }

            context.queue.lock().finish_job();
            self.dictionary.reset();
        }

        Ok(TargetEnd::Done)
    }

    // Polls the running fuzzer until the job ends one way or another
    async fn process(
        &mut self,
        fuzzer: &Fuzzer,
        context: &TargetContext,
        target_started: Instant,
    ) -> Result<JobEnd> {
        loop {
            let finished = match fuzzer.wait(POLL_INTERVAL).await {
                Ok(finished) => finished,
                Err(error) => {
                    fuzzer.stop();
                    return Err(error);
                }
            };

            {
                let queue = context.queue.lock();
                self.output.progress(Progress {
                    index: fuzzer.current_index(),
                    total: fuzzer.dictionary_len(),
                    rate: fuzzer.rate(),
                    job: queue.jobs_processed() + 1,
                    jobs: queue.total_jobs(),
                    errors: context.errors.load(Ordering::SeqCst),
                });
            }

            if finished {
                return Ok(match fuzzer.outcome() {
                    Some(ScanOutcome::Stop(reason)) => JobEnd::Target(TargetEnd::Quit(reason)),
                    Some(ScanOutcome::SkipTarget(reason)) => JobEnd::Target(TargetEnd::Skipped(reason)),
                    _ => JobEnd::Finished,
                });
            }

            if let Some(max_time) = self.config.control.max_time {
                if self.started.elapsed() > max_time {
                    drain(fuzzer).await?;
                    return Ok(JobEnd::Target(TargetEnd::Quit(
                        "Canceled because the runtime exceeded the maximal set by user".to_string(),
                    )));
                }
            }
            if let Some(max_time) = self.config.control.target_max_time {
                if target_started.elapsed() > max_time {
                    drain(fuzzer).await?;
                    return Ok(JobEnd::Target(TargetEnd::Skipped(
                        "Skipped the target because the runtime exceeded the maximal set by user".to_string(),
                    )));
                }
            }

            // a run that already stopped has nothing left to pause
            if self.interrupted() && fuzzer.state() == FuzzerState::Running {
                self.output.warning("CTRL+C detected: Pausing threads, please wait...");
                fuzzer.pause().await;
                match self.prompt().await? {
                    Choice::Continue => fuzzer.resume(),
                    Choice::Quit => {
                        drain(fuzzer).await?;
                        return Ok(JobEnd::Target(TargetEnd::Quit("Canceled by the user".to_string())));
                    }
                    Choice::Next => {
                        drain(fuzzer).await?;
                        if context.queue.lock().waiting() > 0 {
                            return Ok(JobEnd::Skipped);
                        }
                        return Ok(JobEnd::Target(TargetEnd::Skipped("Skipped by the user".to_string())));
                    }
                }
            }
        }
    }

    fn interrupted(&mut self) -> bool {
        let Some(interrupts) = self.interrupts.as_mut() else {
            return false;
        };
        let mut pressed = false;
        while interrupts.try_recv().is_ok() {
            pressed = true;
        }
        pressed
    }

    // Reads the user's choice from stdin. A second Ctrl-C quits.
    async fn prompt(&mut self) -> Result<Choice> {
        loop {
            self.output.warning("[q]uit / [c]ontinue / [n]ext: ");
            let read = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line).map(|n| (n, line))
            });

            let (bytes, line) = tokio::select! {
                read = read => read??,
                _ = next_interrupt(&mut self.interrupts) => return Ok(Choice::Quit),
            };
            if bytes == 0 {
                // stdin closed, nobody to ask
                return Ok(Choice::Quit);
            }

            match line.trim().to_lowercase().as_str() {
                "q" => return Ok(Choice::Quit),
                "c" => return Ok(Choice::Continue),
                "n" => return Ok(Choice::Next),
                _ => continue,
            }
        }
    }

    // Where the scan stands: enough to resume it with restore()
    pub fn snapshot(&self) -> Option<SessionState> {
        let context = self.current.as_ref()?;
        Some(SessionState {
            targets: self.targets.iter().cloned().collect(),
            queue: context.queue.lock().snapshot(),
            dictionary_index: self.dictionary.index(),
        })
    }

    // The next run() starts from `state` instead of the configured targets
    pub fn restore(&mut self, state: SessionState) {
        self.targets = state.targets.iter().cloned().collect();
        self.resume = Some(state);
    }

    pub fn found(&self) -> Vec<FoundEntry> {
        self.output.found_entries()
    }
}

// Stops the fuzzer and waits for its in-flight requests
async fn drain(fuzzer: &Fuzzer) -> Result<()> {
    fuzzer.stop();
    while !fuzzer.wait(POLL_INTERVAL).await? {}
    Ok(())
}

async fn next_interrupt(interrupts: &mut Option<mpsc::UnboundedReceiver<()>>) {
    if let Some(receiver) = interrupts {
        if receiver.recv().await.is_some() {
            return;
        }
    }
    std::future::pending::<()>().await
}
