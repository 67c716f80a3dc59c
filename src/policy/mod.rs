//! Reminder-timing policies
//!
//! A policy maps an observation to a reminder shift. Learned policies are
//! produced by a [`PolicyOptimizer`] and shipped as a [`PolicyCheckpoint`].
//!
//! Baselines:
//! - ZeroShiftPolicy: never moves the reminder
//! - ConstantShiftPolicy: always moves it by the same amount

mod optimizer;

pub use optimizer::{
    BaselineOptimizer, Hyperparameters, OptimizerStats, PolicyCheckpoint, PolicyOptimizer,
    KIND_CONSTANT_SHIFT, KIND_ZERO_SHIFT,
};

use crate::types::{Action, Observation};

/// Zero-shift policy version
pub const ZERO_SHIFT_VERSION: &str = "zero-shift-v1";

/// Constant-shift policy version
pub const CONSTANT_SHIFT_VERSION: &str = "constant-shift-v1";

/// Maps observations to reminder shifts
pub trait Policy: Send + Sync {
    /// Version string of this policy implementation
    fn version(&self) -> &str;

    /// Choose a shift for `observation`.
    ///
    /// With `deterministic` set, the same observation always yields the same
    /// action; stochastic policies may explore otherwise.
    fn act(&self, observation: &Observation, deterministic: bool) -> Action;
}

/// Keeps every reminder at its scheduled time
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroShiftPolicy;

impl Policy for ZeroShiftPolicy {
    fn version(&self) -> &str {
        ZERO_SHIFT_VERSION
    }

    fn act(&self, _observation: &Observation, _deterministic: bool) -> Action {
        Action(0.0)
    }
}

/// Shifts every reminder by a fixed number of minutes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantShiftPolicy {
    pub shift_minutes: f64,
}

impl ConstantShiftPolicy {
    pub fn new(shift_minutes: f64) -> Self {
        Self { shift_minutes }
    }
}

impl Policy for ConstantShiftPolicy {
    fn version(&self) -> &str {
        CONSTANT_SHIFT_VERSION
    }

    fn act(&self, _observation: &Observation, _deterministic: bool) -> Action {
        Action(self.shift_minutes)
    }
}
