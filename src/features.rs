//! Compliance and reward scoring
//!
//! Two compliance scales coexist:
//! - intake compliance, used by the historical feature pipeline (taken flag
//!   plus a one-hour tolerance)
//! - timing compliance, used inside the decision environment (30 minute
//!   tolerance, linear decay to zero at two hours)
//!
//! The reward shaping used by the environment lives here as well so the
//! monotonicity properties can be checked in one place.

use serde::{Deserialize, Serialize};

/// Deviation under which a taken dose counts as fully on time (pipeline)
pub const INTAKE_ON_TIME_MINUTES: f64 = 60.0;

/// Deviation under which a step counts as fully compliant (environment)
pub const TIMING_TOLERANCE_MINUTES: f64 = 30.0;

/// Deviation at which timing compliance reaches zero
pub const TIMING_ZERO_MINUTES: f64 = 120.0;

/// Deviation under which the full on-time reward is granted
pub const REWARD_FULL_MINUTES: f64 = 15.0;

/// Deviation at which the positive reward has decayed to zero
pub const REWARD_DECAY_MINUTES: f64 = 60.0;

/// Scale applied to the penalty once the positive reward is exhausted
pub const PENALTY_SCALE_MINUTES: f64 = 120.0;

/// Compliance of one logged intake: 1.0 on time, 0.5 late/early, 0.0 missed
pub fn intake_compliance(taken: bool, deviation_minutes: Option<f64>) -> f64 {
    match (taken, deviation_minutes) {
        (false, _) | (true, None) => 0.0,
        (true, Some(dev)) if dev.abs() < INTAKE_ON_TIME_MINUTES => 1.0,
        (true, Some(_)) => 0.5,
    }
}

/// Compliance of a simulated step given its deviation from the reminder
pub fn timing_compliance(deviation_minutes: f64) -> f64 {
    let dev = deviation_minutes.abs();
    if dev < TIMING_TOLERANCE_MINUTES {
        1.0
    } else {
        (1.0 - dev / TIMING_ZERO_MINUTES).max(0.0)
    }
}

/// Reward magnitudes used by the environment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardShape {
    /// Reward for an intake within 15 minutes of the reminder
    pub reward_on_time: f64,
    /// Penalty reached at a two hour deviation (negative)
    pub penalty_missed: f64,
}

impl Default for RewardShape {
    fn default() -> Self {
        Self {
            reward_on_time: 10.0,
            penalty_missed: -20.0,
        }
    }
}

impl RewardShape {
    /// Reward for a realized deviation.
    ///
    /// Full reward under 15 minutes, linear decay to zero at 60 minutes, then a
    /// penalty growing with the deviation (it keeps growing past 120 minutes).
    pub fn reward(&self, deviation_minutes: f64) -> f64 {
        let dev = deviation_minutes.abs();
        if dev < REWARD_FULL_MINUTES {
            self.reward_on_time
        } else if dev < REWARD_DECAY_MINUTES {
            self.reward_on_time * (1.0 - dev / REWARD_DECAY_MINUTES)
        } else {
            self.penalty_missed * (dev / PENALTY_SCALE_MINUTES)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_compliance_levels() {
        assert_eq!(intake_compliance(true, Some(10.0)), 1.0);
        assert_eq!(intake_compliance(true, Some(-59.9)), 1.0);
        assert_eq!(intake_compliance(true, Some(60.0)), 0.5);
        assert_eq!(intake_compliance(true, Some(-240.0)), 0.5);
        assert_eq!(intake_compliance(false, Some(0.0)), 0.0);
        assert_eq!(intake_compliance(false, None), 0.0);
    }

    #[test]
    fn test_timing_compliance_exact_inside_tolerance() {
        for dev in [-29.9, -10.0, 0.0, 5.0, 29.99] {
            assert_eq!(timing_compliance(dev), 1.0);
        }
    }

    #[test]
    fn test_timing_compliance_non_increasing() {
        let mut previous = timing_compliance(30.0);
        let mut dev = 30.0;
        while dev <= 200.0 {
            let current = timing_compliance(dev);
            assert!(current <= previous + 1e-12, "increase at {}", dev);
            assert!((0.0..=1.0).contains(&current));
            previous = current;
            dev += 0.5;
        }
        assert_eq!(timing_compliance(120.0), 0.0);
        assert_eq!(timing_compliance(-300.0), 0.0);
    }

    #[test]
    fn test_reward_anchor_points() {
        let shape = RewardShape::default();
        assert_eq!(shape.reward(0.0), 10.0);
        assert_eq!(shape.reward(14.9), 10.0);
        assert!((shape.reward(30.0) - 5.0).abs() < 1e-9);
        assert!(shape.reward(59.999).abs() < 1e-3);
        assert_eq!(shape.reward(120.0), -20.0);
        assert_eq!(shape.reward(-120.0), -20.0);
        assert_eq!(shape.reward(240.0), -40.0);
    }

    #[test]
    fn test_reward_non_increasing() {
        let shape = RewardShape::default();
        let mut previous = shape.reward(0.0);
        let mut dev = 0.0;
        while dev <= 300.0 {
            let current = shape.reward(dev);
            assert!(current <= previous + 1e-12, "increase at {}", dev);
            previous = current;
            dev += 0.25;
        }
    }
}
