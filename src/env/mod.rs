//! Sequential-decision environment for reminder timing
//!
//! Gym-style contract:
//! - reset(seed) -> observation
//! - step(action) -> (observation, reward, done, info)
//!
//! The environment owns only the state of the current episode. Whatever is
//! learned across episodes lives in the policy optimizer consuming the
//! returned transitions.

mod adaptive;
mod intake;

pub use adaptive::{AdaptiveEnv, EnvPhase, EpisodeState};
pub use intake::{
    FixedOffsetIntakes, IntakeSource, RecordedIntakes, SimulatedIntakeConfig, SimulatedIntakes,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{Action, Observation};

/// Result of a single environment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action
    pub observation: Observation,
    /// The reward for this step
    pub reward: f64,
    /// Whether the episode has terminated
    pub done: bool,
    /// Diagnostics about the step
    pub info: StepInfo,
}

/// Diagnostics returned from a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Steps taken in this episode, including this one
    pub step: u32,
    /// Nominal time of the dose
    pub scheduled_time: NaiveDateTime,
    /// Reminder time after applying the (clamped) shift
    pub adjusted_time: NaiveDateTime,
    /// When the intake actually happened
    pub realized_time: NaiveDateTime,
    /// Shift actually applied after clamping, minutes
    pub applied_shift_minutes: f64,
    /// Timing compliance of this step
    pub compliance: f64,
    /// Set once the episode is over
    pub termination_reason: Option<String>,
}

/// Capability shared by every environment variant
pub trait Environment {
    /// Start a new episode; `seed` reseeds any randomness in the intake source
    fn reset(&mut self, seed: Option<u64>) -> Observation;

    /// Apply a reminder shift and observe its consequence
    fn step(&mut self, action: Action) -> StepResult;

    /// Whether the current episode has reached its terminal state
    fn is_done(&self) -> bool;

    /// Latest observation
    fn observation(&self) -> Observation;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self, seed: Option<u64>) -> Observation {
        (**self).reset(seed)
    }

    fn step(&mut self, action: Action) -> StepResult {
        (**self).step(action)
    }

    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn observation(&self) -> Observation {
        (**self).observation()
    }
}
