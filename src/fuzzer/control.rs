// src/fuzzer/control.rs
// =============================================================================
// Run state shared by the fuzzer and its workers.
//
//   Idle -> Running <-> Paused
//              \          /
//               -> Stopped
//
// Workers park on a semaphore that starts with no permits. The parked count
// and the permits handed out change under the same lock, so a worker can't
// park after the wake-up meant for it has gone out.
// =============================================================================

use parking_lot::Mutex;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: FuzzerState,
    parked: usize,
}

#[derive(Debug)]
pub struct RunControl {
    shared: Mutex<Shared>,
    gate: Semaphore,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                state: FuzzerState::Idle,
                parked: 0,
            }),
            gate: Semaphore::new(0),
        }
    }

    pub fn state(&self) -> FuzzerState {
        self.shared.lock().state
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == FuzzerState::Stopped
    }

    pub fn parked(&self) -> usize {
        self.shared.lock().parked
    }

    pub fn start(&self) {
        self.shared.lock().state = FuzzerState::Running;
    }

    pub fn pause(&self) {
        let mut shared = self.shared.lock();
        if shared.state == FuzzerState::Running {
            shared.state = FuzzerState::Paused;
        }
    }

    pub fn resume(&self) {
        let mut shared = self.shared.lock();
        if shared.state == FuzzerState::Paused {
            shared.state = FuzzerState::Running;
            self.gate.add_permits(shared.parked);
            shared.parked = 0;
        }
    }

    pub fn stop(&self) {
        let mut shared = self.shared.lock();
        shared.state = FuzzerState::Stopped;
        self.gate.add_permits(shared.parked);
        shared.parked = 0;
    }

    // Blocks the calling worker while paused. Returns at once otherwise.
    pub async fn park(&self) {
        {
            let mut shared = self.shared.lock();
            if shared.state != FuzzerState::Paused {
                return;
            }
            shared.parked += 1;
        }
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_park_returns_when_running() {
        let control = RunControl::new();
        control.start();
        control.park().await;
        assert_eq!(control.parked(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resume_releases_every_parked_worker() {
        let control = Arc::new(RunControl::new());
        control.start();
        control.pause();

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let control = control.clone();
                tokio::spawn(async move { control.park().await })
            })
            .collect();

        while control.parked() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(workers.iter().all(|w| !w.is_finished()));

        control.resume();
        for worker in workers {
            tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(control.state(), FuzzerState::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_releases_parked_workers() {
        let control = Arc::new(RunControl::new());
        control.start();
        control.pause();
        let worker = {
            let control = control.clone();
            tokio::spawn(async move { control.park().await })
        };
        while control.parked() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        control.stop();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
        assert!(control.is_stopped());
        // resume can't bring a stopped run back
        control.resume();
        assert!(control.is_stopped());
    }
}
