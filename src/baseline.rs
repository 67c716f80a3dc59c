//! Rolling compliance window
//!
//! This module keeps the last few compliance scores of a medication (or of an
//! episode) and exposes their mean as the compliance history factor.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of compliance scores kept in the rolling window
pub const COMPLIANCE_WINDOW: usize = 5;

/// History factor reported while no score has been recorded
pub const NEUTRAL_COMPLIANCE: f64 = 0.5;

/// Bounded buffer of recent compliance scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceWindow {
    scores: VecDeque<f64>,
    window_size: usize,
}

impl Default for ComplianceWindow {
    fn default() -> Self {
        Self::new(COMPLIANCE_WINDOW)
    }
}

impl ComplianceWindow {
    /// Create a window keeping at most `window_size` scores
    pub fn new(window_size: usize) -> Self {
        Self {
            scores: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
        }
    }

    /// Record a score, evicting the oldest one when full
    pub fn push(&mut self, score: f64) {
        self.scores.push_back(score);
        while self.scores.len() > self.window_size {
            self.scores.pop_front();
        }
    }

    /// Most recently recorded score
    pub fn last(&self) -> Option<f64> {
        self.scores.back().copied()
    }

    /// Mean of the retained scores, if any
    pub fn mean(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        let sum: f64 = self.scores.iter().sum();
        Some(sum / self.scores.len() as f64)
    }

    /// Mean of the retained scores, neutral when empty
    pub fn factor(&self) -> f64 {
        self.mean().unwrap_or(NEUTRAL_COMPLIANCE)
    }

    /// Retained scores, oldest first
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }
}
