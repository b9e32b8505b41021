// src/fuzzer/engine.rs
// =============================================================================
// The worker pool that runs one job (one base path) against the dictionary.
//
// Each worker is a tokio task looping over:
//   1. stop/pause check
//   2. pull the next entry from the shared dictionary cursor
//   3. for each prefix/suffix variant of it: scan (request + wildcard check)
//   4. optional delay
//
// All workers share one Inner behind an Arc: the requester, the dictionary
// cursor, the scanned set and the run state.
//
// BEGINNER NOTES:
// - `fn scan(self: &Arc<Self>, ..) -> BoxFuture<..>`: an async fn can't call
//   itself directly (its future would contain itself). Boxing the future
//   gives it a known size, which crawling needs to recurse into links.
// - parking_lot guards are never held across an .await: every lock is taken
//   and released within one statement.
// =============================================================================

use super::callbacks::{Callbacks, ScanOutcome};
use super::control::{FuzzerState, RunControl};
use super::rate::RateLimiter;
use crate::config::Config;
use crate::crawl;
use crate::dictionary::Dictionary;
use crate::error::RequestError;
use crate::requester::{Requester, Response};
use crate::scanner::ScannerSet;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PAUSE_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    requester: Arc<dyn Requester>,
    dictionary: Arc<Dictionary>,
    config: Arc<Config>,
    callbacks: Callbacks,
    control: RunControl,
    limiter: RateLimiter,
    base_path: RwLock<String>,
    scanners: RwLock<Arc<ScannerSet>>,
    /// Full paths already requested in this target
    scanned: Mutex<HashSet<String>>,
    /// First error returned by a match callback, raised by wait()
    pending_error: Mutex<Option<anyhow::Error>>,
    /// First non-Continue answer from a callback
    outcome: Mutex<Option<ScanOutcome>>,
    active: AtomicUsize,
}

pub struct Fuzzer {
    inner: Arc<Inner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Fuzzer {
    pub fn new(
        requester: Arc<dyn Requester>,
        dictionary: Arc<Dictionary>,
        config: Arc<Config>,
        callbacks: Callbacks,
    ) -> Self {
        let limiter = RateLimiter::new(config.fuzz.max_rate);
        Self {
            inner: Arc::new(Inner {
                requester,
                dictionary,
                config,
                callbacks,
                control: RunControl::new(),
                limiter,
                base_path: RwLock::new(String::new()),
                scanners: RwLock::new(Arc::new(ScannerSet::default())),
                scanned: Mutex::new(HashSet::new()),
                pending_error: Mutex::new(None),
                outcome: Mutex::new(None),
                active: AtomicUsize::new(0),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    // The job to run next: a path relative to the target root, "" or ending with '/'
    pub fn set_base_path(&self, base_path: &str) {
        *self.inner.base_path.write() = base_path.to_string();
    }

    pub fn base_path(&self) -> String {
        self.inner.base_path.read().clone()
    }

    // Calibrates the scanners for the current base path, then spawns the
    // workers. Returns once they are running; use wait() to follow them.
    pub async fn start(&self) -> Result<(), RequestError> {
        let base_path = self.base_path();
        let scanners = ScannerSet::setup(
            self.inner.requester.as_ref(),
            &base_path,
            &self.inner.config.dictionary,
            &self.inner.config.fuzz,
        )
        .await?;
        info!("Calibrated {} scanners for /{}", scanners.len(), base_path);
        *self.inner.scanners.write() = Arc::new(scanners);

        *self.inner.outcome.lock() = None;
        *self.inner.pending_error.lock() = None;
        self.inner.control.start();

        let workers = self
            .inner
            .config
            .fuzz
            .threads
            .min(self.inner.dictionary.len());
        let mut handles = self.handles.lock();
        handles.clear();
        for _ in 0..workers {
            self.inner.active.fetch_add(1, Ordering::SeqCst);
            let inner = self.inner.clone();
            handles.push(tokio::spawn(async move { inner.work().await }));
        }
        debug!("Spawned {} workers", workers);

        Ok(())
    }

    // Parks every worker after its current entry. Returns once all live
    // workers are parked, or after a few seconds at most.
    pub async fn pause(&self) {
        self.inner.control.pause();
        let deadline = Instant::now() + PAUSE_TIMEOUT;
        while self.inner.control.parked() < self.inner.active.load(Ordering::SeqCst)
            && Instant::now() < deadline
        {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn resume(&self) {
        self.inner.control.resume();
    }

    // Workers finish their in-flight request, then exit
    pub fn stop(&self) {
        self.inner.control.stop();
    }

    pub fn state(&self) -> FuzzerState {
        self.inner.control.state()
    }

    pub fn is_finished(&self) -> bool {
        self.handles.lock().iter().all(JoinHandle::is_finished)
    }

    // Waits up to `timeout` for every worker to exit.
    // Ok(true) = all done, Ok(false) = still running, Err = a match callback failed.
    pub async fn wait(&self, timeout: Duration) -> anyhow::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.inner.pending_error.lock().take();
            if let Some(error) = pending {
                return Err(error);
            }
            if self.is_finished() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    // Why the run was cut short, if a callback asked for it. Cleared by start().
    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.inner.outcome.lock().clone()
    }

    pub fn current_index(&self) -> usize {
        self.inner.dictionary.index()
    }

    pub fn dictionary_len(&self) -> usize {
        self.inner.dictionary.len()
    }

    pub fn scanned_count(&self) -> usize {
        self.inner.scanned.lock().len()
    }

    pub fn rate(&self) -> usize {
        self.inner.limiter.rate()
    }
}

impl Inner {
    async fn work(self: Arc<Self>) {
        let delay = self.config.fuzz.delay;
        loop {
            if self.control.state() == FuzzerState::Paused {
                self.control.park().await;
            }
            if self.control.is_stopped() {
                break;
            }

            let Some((_, entry)) = self.dictionary.next() else {
                break;
            };
            for path in self.dictionary.variants(&entry) {
                self.scan(path).await;
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    // `relative` is relative to the base path
    fn scan(self: &Arc<Self>, relative: String) -> BoxFuture<'_, ()> {
        async move {
            let base_path = self.base_path.read().clone();
            let full_path = format!("{}{}", base_path, relative);

            let fresh = self.scanned.lock().insert(full_path.clone());
            if !fresh {
                return;
            }

            self.limiter.acquire().await;
            let response = match self.requester.request(&full_path, None).await {
                Ok(response) => response,
                Err(error) => {
                    self.report_error(&full_path, &error);
                    return;
                }
            };

            let scanners = self.scanners.read().clone();
            if !scanners.is_found(&relative, &full_path, &response) {
                for callback in &self.callbacks.on_not_found {
                    callback(&full_path, &response);
                }
                return;
            }

            self.report_match(&full_path, &response);

            if self.config.fuzz.crawl {
                let scope = format!("{}{}", self.requester.base_url(), base_path);
                for link in crawl::crawl(&response, &scope) {
                    if self.control.is_stopped() {
                        break;
                    }
                    if self.dictionary.is_valid(&link) {
                        debug!("Crawled /{}{}", base_path, link);
                        self.scan(link).await;
                    }
                }
            }
        }
        .boxed()
    }

    fn report_match(&self, path: &str, response: &Response) {
        for callback in &self.callbacks.on_match {
            match callback(path, response) {
                Ok(ScanOutcome::Continue) => {}
                Ok(outcome) => self.finish(outcome),
                Err(error) => {
                    let mut pending = self.pending_error.lock();
                    if pending.is_none() {
                        *pending = Some(error);
                    }
                }
            }
        }
    }

    fn report_error(&self, path: &str, error: &RequestError) {
        for callback in &self.callbacks.on_error {
            let outcome = callback(path, error);
            if !outcome.is_continue() {
                self.finish(outcome);
            }
        }
    }

    // Keeps the first reason given and stops the run
    fn finish(&self, outcome: ScanOutcome) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
        self.control.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DictionaryOptions};
    use crate::error::RequestErrorKind;
    use crate::requester::mock::{MockReply, MockRequester};

    fn config(threads: usize) -> Arc<Config> {
        let mut config = Config::default();
        config.fuzz.threads = threads;
        Arc::new(config)
    }

    fn dictionary(words: &[&str]) -> Arc<Dictionary> {
        let lines = words.iter().map(|w| w.to_string()).collect();
        Arc::new(Dictionary::new(lines, DictionaryOptions::default()))
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_request_gets_exactly_one_callback() {
        let requester = Arc::new(MockRequester::new("http://target/", |path| {
            if path.starts_with("err_") {
                Err(RequestError::new(RequestErrorKind::Connection, "Cannot connect to: target"))
            } else if path.starts_with("ok_") {
                Ok(MockReply::new(200, format!("page {}", path)))
            } else {
                Ok(MockReply::new(404, "not found"))
            }
        }));
        let words: Vec<String> = (0..90)
            .map(|i| match i % 3 {
                0 => format!("ok_{}", i),
                1 => format!("err_{}", i),
                _ => format!("miss_{}", i),
            })
            .collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        let (matched, missing, failed) = (counter(), counter(), counter());
        let callbacks = {
            let (m, n, e) = (matched.clone(), missing.clone(), failed.clone());
            Callbacks::new()
                .on_match(move |_, _| {
                    m.fetch_add(1, Ordering::SeqCst);
                    Ok(ScanOutcome::Continue)
                })
                .on_not_found(move |_, _| {
                    n.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_, _| {
                    e.fetch_add(1, Ordering::SeqCst);
                    ScanOutcome::Continue
                })
        };

        let fuzzer = Fuzzer::new(requester.clone(), dictionary(&words), config(8), callbacks);
        fuzzer.start().await.unwrap();
        let after_calibration = requester.request_count();
        assert!(fuzzer.wait(Duration::from_secs(10)).await.unwrap());

        let sent = requester.request_count() - after_calibration;
        assert_eq!(sent, 90);
        assert_eq!(matched.load(Ordering::SeqCst), 30);
        assert_eq!(missing.load(Ordering::SeqCst), 30);
        assert_eq!(failed.load(Ordering::SeqCst), 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pause_and_resume_lose_nothing() {
        let requester = Arc::new(
            MockRequester::new("http://target/", |_| Ok(MockReply::new(404, "not found")))
                .with_latency(Duration::from_millis(5)),
        );
        let words: Vec<String> = (0..200).map(|i| format!("word{}", i)).collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let dictionary = dictionary(&words);

        let fuzzer = Fuzzer::new(requester.clone(), dictionary.clone(), config(8), Callbacks::new());
        fuzzer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        fuzzer.pause().await;
        assert_eq!(fuzzer.state(), FuzzerState::Paused);
        let paused_at = requester.request_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(requester.request_count(), paused_at);
        assert!(!fuzzer.is_finished());

        fuzzer.resume();
        assert!(fuzzer.wait(Duration::from_secs(10)).await.unwrap());
        assert!(requester.request_count() > paused_at);
        assert_eq!(fuzzer.scanned_count(), dictionary.len());
        assert_eq!(fuzzer.current_index(), fuzzer.dictionary_len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_skip_outcome_stops_workers() {
        let requester = Arc::new(MockRequester::new("http://target/", |path| {
            if path == "word3" {
                Ok(MockReply::new(503, "maintenance"))
            } else {
                Ok(MockReply::new(404, "not found"))
            }
        }));
        let words: Vec<String> = (0..500).map(|i| format!("word{}", i)).collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        let callbacks = Callbacks::new().on_match(|_, response| {
            Ok(if response.status == 503 {
                ScanOutcome::SkipTarget("Server returned 503".to_string())
            } else {
                ScanOutcome::Continue
            })
        });
        let fuzzer = Fuzzer::new(requester, dictionary(&words), config(1), callbacks);
        fuzzer.start().await.unwrap();
        assert!(fuzzer.wait(Duration::from_secs(10)).await.unwrap());

        assert_eq!(fuzzer.state(), FuzzerState::Stopped);
        assert_eq!(
            fuzzer.outcome(),
            Some(ScanOutcome::SkipTarget("Server returned 503".to_string()))
        );
        assert!(fuzzer.current_index() < 500);
    }

    #[tokio::test]
    async fn test_callback_error_is_raised_by_wait() {
        let requester = Arc::new(MockRequester::new("http://target/", |path| {
            if path == "admin" {
                Ok(MockReply::new(200, "admin"))
            } else {
                Ok(MockReply::new(404, "not found"))
            }
        }));
        let callbacks = Callbacks::new().on_match(|_, _| anyhow::bail!("output closed"));
        let fuzzer = Fuzzer::new(requester, dictionary(&["admin"]), config(2), callbacks);
        fuzzer.start().await.unwrap();

        let error = fuzzer.wait(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(error.to_string(), "output closed");
    }

    #[tokio::test]
    async fn test_variants_and_base_path() {
        let requester = Arc::new(MockRequester::new("http://target/", |_| {
            Ok(MockReply::new(404, "not found"))
        }));
        let mut config = Config::default();
        config.dictionary.suffixes = vec!["~".to_string()];
        let dictionary = Arc::new(Dictionary::new(
            vec!["index.php".to_string(), "img/".to_string()],
            config.dictionary.clone(),
        ));

        let fuzzer = Fuzzer::new(requester.clone(), dictionary, Arc::new(config), Callbacks::new());
        fuzzer.set_base_path("app/");
        fuzzer.start().await.unwrap();
        let after_calibration = requester.request_count();
        assert!(fuzzer.wait(Duration::from_secs(5)).await.unwrap());

        let mut sent = requester.requested()[after_calibration..].to_vec();
        sent.sort();
        assert_eq!(sent, vec!["app/img/", "app/index.php~"]);
    }

    #[tokio::test]
    async fn test_crawl_follows_links_once() {
        let requester = Arc::new(MockRequester::new("http://target/", |path| match path {
            "app/index.html" => Ok(MockReply::new(
                200,
                r#"<a href="/app/secret.txt">s</a><a href="/app/secret.txt">again</a><a href="/other">o</a>"#,
            )
            .header("Content-Type", "text/html")),
            "app/secret.txt" => Ok(MockReply::new(200, "top secret")),
            _ => Ok(MockReply::new(404, "not found")),
        }));
        let mut config = Config::default();
        config.fuzz.crawl = true;
        let found = Arc::new(Mutex::new(Vec::new()));
        let callbacks = {
            let found = found.clone();
            Callbacks::new().on_match(move |path, _| {
                found.lock().push(path.to_string());
                Ok(ScanOutcome::Continue)
            })
        };

        let fuzzer = Fuzzer::new(
            requester.clone(),
            dictionary(&["index.html"]),
            Arc::new(config),
            callbacks,
        );
        fuzzer.set_base_path("app/");
        fuzzer.start().await.unwrap();
        assert!(fuzzer.wait(Duration::from_secs(5)).await.unwrap());

        assert_eq!(*found.lock(), vec!["app/index.html", "app/secret.txt"]);
        assert!(!requester.requested().iter().any(|p| p == "other"));
    }
}
