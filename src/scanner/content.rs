// src/scanner/content.rs
// =============================================================================
// Decides whether a page is "the same template" as a wildcard baseline, even
// when both carry per-request noise (timestamps, CSRF tokens, echoed paths).
//
// Built from the two calibration bodies:
// - identical bodies -> static: later bodies must be byte-equal to match
// - otherwise -> the whitespace tokens both bodies share in place become
//   ordered anchors. A body matches the baseline if every anchor is found,
//   in order, in its own tokens.
//
// Two safety nets:
// - few anchors (< 20) and a body with more tokens than the baseline: also
//   require a similarity ratio above 0.75
// - no anchors at all: the body matches when its similarity to the
//   baseline reaches the calibrated threshold
// =============================================================================

use super::matcher::SequenceMatcher;

const MIN_ANCHORS: usize = 20;
const LONG_CONTENT_RATIO: f64 = 0.75;
const MAX_THRESHOLD: f64 = 0.98;
const SHORT_BODY: usize = 2000;

#[derive(Debug, Clone)]
pub struct DynamicContentParser {
    baseline: String,
    is_static: bool,
    anchors: Vec<String>,
    threshold: f64,
}

impl DynamicContentParser {
    pub fn new(first: &str, second: &str) -> Self {
        let is_static = first == second;
        let mut anchors = Vec::new();
        let mut threshold = MAX_THRESHOLD;

        if !is_static {
            let first_tokens: Vec<&str> = first.split_whitespace().collect();
            let second_tokens: Vec<&str> = second.split_whitespace().collect();
            let matcher = SequenceMatcher::new(&first_tokens, &second_tokens);
            for block in matcher.matching_blocks() {
                anchors.extend(
                    first_tokens[block.a..block.a + block.size]
                        .iter()
                        .map(|token| token.to_string()),
                );
            }

            let mut ratio = round2(similarity(first, second));
            if first.len() < SHORT_BODY {
                ratio -= 0.1;
            }
            threshold = ratio.min(MAX_THRESHOLD);
        }

        Self {
            baseline: first.to_string(),
            is_static,
            anchors,
            threshold,
        }
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    // True when `content` looks like the baseline page
    pub fn matches(&self, content: &str) -> bool {
        if self.is_static {
            return content == self.baseline;
        }

        let tokens: Vec<&str> = content.split_whitespace().collect();

        if self.anchors.is_empty() {
            return similarity(&self.baseline, content) >= self.threshold;
        }

        let mut position = 0;
        for anchor in &self.anchors {
            match tokens[position..].iter().position(|token| token == anchor) {
                Some(offset) => position += offset + 1,
                None => return false,
            }
        }

        let baseline_tokens = self.baseline.split_whitespace().count();
        if self.anchors.len() < MIN_ANCHORS && tokens.len() > baseline_tokens {
            return similarity(&self.baseline, content) > LONG_CONTENT_RATIO;
        }

        true
    }
}

fn similarity(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(a.as_bytes(), b.as_bytes()).ratio()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
