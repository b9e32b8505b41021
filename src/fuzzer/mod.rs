// src/fuzzer/mod.rs
// =============================================================================
// The concurrency engine: a pool of workers pulling paths from the
// dictionary, requesting them and judging the responses with the scanners.
//
// Submodules:
// - callbacks: what listeners receive, and ScanOutcome, what they answer
// - control:   the Idle/Running/Paused/Stopped state and the pause gate
// - rate:      the requests-per-second limiter
// - engine:    the Fuzzer itself
// =============================================================================

mod callbacks;
mod control;
mod engine;
mod rate;

pub use callbacks::{Callbacks, ScanOutcome};
pub use control::FuzzerState;
pub use engine::Fuzzer;
