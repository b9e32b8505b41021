// src/controller/session.rs
// =============================================================================
// Checkpoint of a scan in progress: enough to pick it up again later.
//
// Only the state is defined here (serde structs); where it gets stored is up
// to the caller.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueState {
    /// Every job ever queued for the target, sorted
    pub passed: Vec<String>,
    /// Jobs not finished yet, the one in progress first
    pub pending: Vec<String>,
    pub jobs_processed: usize,
    pub total_jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// The target being scanned, then the ones not started yet
    pub targets: Vec<String>,
    pub queue: JobQueueState,
    /// Dictionary entries already handed out in the current job
    pub dictionary_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_json_shape() {
        let state = SessionState {
            targets: vec!["http://example.com/".to_string()],
            queue: JobQueueState {
                passed: vec!["".to_string(), "admin/".to_string()],
                pending: vec!["admin/".to_string()],
                jobs_processed: 1,
                total_jobs: 2,
            },
            dictionary_index: 42,
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["queue"]["pending"][0], "admin/");
        assert_eq!(json["dictionary_index"], 42);

        let back: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
