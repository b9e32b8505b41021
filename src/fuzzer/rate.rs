// src/fuzzer/rate.rs
// =============================================================================
// Requests-per-second governor.
//
// A counter of requests sent during the last second: a request may only go
// out while the counter is below the limit; it takes a slot, and the slot
// is given back one second later. So no one-second window ever holds more
// than `max_rate` requests.
//
// With no limit (0) the counter still runs, it is what rate() reports.
// =============================================================================

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);
const POLL: Duration = Duration::from_millis(10);

// rate() is read by the progress display far more often than it changes
#[derive(Debug, Default)]
struct RateGauge {
    computed_at: Option<Instant>,
    value: usize,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_rate: usize,
    in_window: Arc<AtomicUsize>,
    gauge: Mutex<RateGauge>,
}

impl RateLimiter {
    pub fn new(max_rate: usize) -> Self {
        Self {
            max_rate,
            in_window: Arc::new(AtomicUsize::new(0)),
            gauge: Mutex::new(RateGauge::default()),
        }
    }

    // Waits for a free slot in the current window and takes it
    pub async fn acquire(&self) {
        if self.max_rate == 0 {
            self.in_window.fetch_add(1, Ordering::SeqCst);
        } else {
            loop {
                let current = self.in_window.load(Ordering::SeqCst);
                if current < self.max_rate
                    && self
                        .in_window
                        .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    break;
                }
                if current >= self.max_rate {
                    tokio::time::sleep(POLL).await;
                }
            }
        }

        let in_window = self.in_window.clone();
        tokio::spawn(async move {
            tokio::time::sleep(WINDOW).await;
            in_window.fetch_sub(1, Ordering::SeqCst);
        });
    }

    // Requests sent during the last second, refreshed at most once a second
    pub fn rate(&self) -> usize {
        let mut gauge = self.gauge.lock();
        let now = Instant::now();
        let fresh = gauge
            .computed_at
            .map(|at| now.duration_since(at) < WINDOW)
            .unwrap_or(false);
        if !fresh {
            gauge.value = self.in_window.load(Ordering::SeqCst);
            gauge.computed_at = Some(now);
        }
        gauge.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_window_exceeds_max_rate() {
        let limiter = Arc::new(RateLimiter::new(5));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let limiter = limiter.clone();
                let stamps = stamps.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    stamps.lock().push(Instant::now());
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut stamps = stamps.lock().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 12);
        // a little slack for scheduling
        let window = Duration::from_millis(900);
        for (i, start) in stamps.iter().enumerate() {
            let in_window = stamps[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(in_window <= 5, "{} requests within one window", in_window);
        }
        // 12 requests at 5/s need at least two full windows
        assert!(stamps[11].duration_since(stamps[0]) >= Duration::from_millis(1900));
    }

    #[tokio::test]
    async fn test_unlimited_still_counts() {
        let limiter = RateLimiter::new(0);
        for _ in 0..7 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.rate(), 7);
    }

    #[tokio::test]
    async fn test_rate_is_cached_for_a_second() {
        let limiter = RateLimiter::new(0);
        limiter.acquire().await;
        assert_eq!(limiter.rate(), 1);
        limiter.acquire().await;
        // still the cached value
        assert_eq!(limiter.rate(), 1);
    }
}
