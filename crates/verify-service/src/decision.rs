//! Turns an embedding distance into a verdict and a 0-100 confidence score.
//!
//! The score is a linear map: distance 0 scores 100, the threshold scores 50
//! and anything at or beyond twice the threshold scores 0. The verdict only
//! looks at the raw distance, never at the rounded score.

use serde::{Deserialize, Serialize};

/// Distance threshold used when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 20.0;

/// Score reported when no identity store is configured.
pub const STATELESS_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub score: u8,
    /// `None` when the decision was made without a store lookup.
    pub distance: Option<f64>,
}

impl Decision {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl DecisionPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, distance: f64) -> u8 {
        let max_score_distance = self.threshold * 2.0;
        let raw = (max_score_distance - distance) / max_score_distance * 100.0;
        // Half-way scores round to even (62.5 -> 62).
        raw.clamp(0.0, 100.0).round_ties_even() as u8
    }

    pub fn decide(&self, distance: f64) -> Decision {
        let verdict = if distance < self.threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        Decision {
            verdict,
            score: self.score(distance),
            distance: Some(distance),
        }
    }

    /// Fixed pass used in stateless mode.
    pub fn stateless(&self) -> Decision {
        Decision {
            verdict: Verdict::Pass,
            score: STATELESS_SCORE,
            distance: None,
        }
    }
}
