//! Adaptive reminder environment
//!
//! Each step schedules one dose: the policy shifts the reminder, the intake
//! source decides when the dose was really taken, and the deviation between
//! the two drives compliance and reward.

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

use super::intake::IntakeSource;
use super::{Environment, StepInfo, StepResult};
use crate::baseline::ComplianceWindow;
use crate::config::EnvConfig;
use crate::features::{timing_compliance, RewardShape};
use crate::types::{
    duration_from_hours, duration_from_minutes, hour_of_day, minutes_between, Action, Observation,
};

const REASON_LENGTH_REACHED: &str = "episode length reached";
const REASON_ALREADY_DONE: &str = "episode already done";

/// Lifecycle of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvPhase {
    /// Accepting steps
    Ready,
    /// Episode over; steps are no-ops until the next reset
    Terminal,
}

/// Snapshot of the current episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    pub phase: EnvPhase,
    pub step: u32,
    pub observation: Observation,
    /// Compliance of the most recent steps, oldest first
    pub history: Vec<f64>,
    /// Nominal time of the next dose
    pub next_scheduled: NaiveDateTime,
}

/// Reminder-timing environment over a pluggable intake source
pub struct AdaptiveEnv<S: IntakeSource> {
    config: EnvConfig,
    reward_shape: RewardShape,
    source: S,
    phase: EnvPhase,
    step_count: u32,
    observation: Observation,
    history: ComplianceWindow,
    scheduled: NaiveDateTime,
    last_info: Option<StepInfo>,
}

impl<S: IntakeSource> AdaptiveEnv<S> {
    /// Create an environment, already reset and ready for its first step
    pub fn new(config: EnvConfig, source: S) -> Self {
        let reward_shape = config.reward_shape();
        let mut env = Self {
            config,
            reward_shape,
            source,
            phase: EnvPhase::Ready,
            step_count: 0,
            observation: Observation::neutral(),
            history: ComplianceWindow::default(),
            scheduled: NaiveDateTime::default(),
            last_info: None,
        };
        env.reset(None);
        env
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn phase(&self) -> EnvPhase {
        self.phase
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn state(&self) -> EpisodeState {
        EpisodeState {
            phase: self.phase,
            step: self.step_count,
            observation: self.observation,
            history: self.history.iter().collect(),
            next_scheduled: self.scheduled,
        }
    }

    fn terminal_result(&self) -> StepResult {
        let info = match &self.last_info {
            Some(info) => StepInfo {
                termination_reason: Some(REASON_ALREADY_DONE.to_string()),
                ..info.clone()
            },
            None => StepInfo {
                step: self.step_count,
                scheduled_time: self.scheduled,
                adjusted_time: self.scheduled,
                realized_time: self.scheduled,
                applied_shift_minutes: 0.0,
                compliance: self.history.factor(),
                termination_reason: Some(REASON_ALREADY_DONE.to_string()),
            },
        };

        StepResult {
            observation: self.observation,
            reward: 0.0,
            done: true,
            info,
        }
    }
}

impl<S: IntakeSource> Environment for AdaptiveEnv<S> {
    fn reset(&mut self, seed: Option<u64>) -> Observation {
        let anchor = self.source.episode_anchor(seed);
        self.scheduled = self.config.episode_anchor.unwrap_or(anchor);
        self.step_count = 0;
        self.history.clear();
        self.observation = Observation::neutral();
        self.last_info = None;
        self.phase = if self.config.episode_length == 0 {
            EnvPhase::Terminal
        } else {
            EnvPhase::Ready
        };
        self.observation
    }

    fn step(&mut self, action: Action) -> StepResult {
        if self.phase == EnvPhase::Terminal {
            return self.terminal_result();
        }

        // Stage 1: shift the reminder
        let shift = action.clamped(self.config.max_time_shift).minutes();
        let scheduled = self.scheduled;
        let adjusted = scheduled + duration_from_minutes(shift);

        // Stage 2: observe the intake
        let realized = self.source.realized_intake(scheduled, adjusted);
        let deviation = minutes_between(adjusted, realized);

        // Stage 3: score it
        let compliance = timing_compliance(deviation);
        self.history.push(compliance);
        let reward = self.reward_shape.reward(deviation);

        self.observation = Observation::new(deviation, self.history.factor(), hour_of_day(realized));
        self.step_count += 1;
        self.scheduled = scheduled + duration_from_hours(self.config.dose_interval_hours);

        let done = self.step_count >= self.config.episode_length;
        if done {
            self.phase = EnvPhase::Terminal;
        }

        debug!(
            "step {}: shift {:.1} min, deviation {:.1} min, reward {:.2}",
            self.step_count, shift, deviation, reward
        );

        let info = StepInfo {
            step: self.step_count,
            scheduled_time: scheduled,
            adjusted_time: adjusted,
            realized_time: realized,
            applied_shift_minutes: shift,
            compliance,
            termination_reason: done.then(|| REASON_LENGTH_REACHED.to_string()),
        };
        self.last_info = Some(info.clone());

        StepResult {
            observation: self.observation,
            reward,
            done,
            info,
        }
    }

    fn is_done(&self) -> bool {
        self.phase == EnvPhase::Terminal
    }

    fn observation(&self) -> Observation {
        self.observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{FixedOffsetIntakes, SimulatedIntakeConfig, SimulatedIntakes};
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn fixed_env(offset: f64, episode_length: u32) -> AdaptiveEnv<FixedOffsetIntakes> {
        AdaptiveEnv::new(
            EnvConfig::deterministic(episode_length, anchor()),
            FixedOffsetIntakes::new(anchor(), offset),
        )
    }

    #[test]
    fn test_reset_is_neutral() {
        let mut env = fixed_env(10.0, 5);
        env.step(Action(0.0));
        let obs = env.reset(None);

        assert_eq!(obs, Observation::neutral());
        assert_eq!(env.step_count(), 0);
        assert!(env.state().history.is_empty());
        assert!(!env.is_done());
    }

    #[test]
    fn test_step_on_time() {
        let mut env = fixed_env(10.0, 5);
        let result = env.step(Action(10.0));

        assert_eq!(result.reward, 10.0);
        assert!(!result.done);
        assert_eq!(result.info.compliance, 1.0);
        assert_eq!(result.info.adjusted_time, anchor() + Duration::minutes(10));
        assert_eq!(result.info.realized_time, anchor() + Duration::minutes(10));
        assert_eq!(result.observation.deviation_minutes, 0.0);
        assert_eq!(result.observation.history_factor, 1.0);
        assert!((result.observation.hour_of_day - (8.0 + 10.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_shift_is_clamped() {
        let mut env = fixed_env(0.0, 5);
        let result = env.step(Action(500.0));

        assert_eq!(result.info.applied_shift_minutes, 120.0);
        assert_eq!(result.info.adjusted_time, anchor() + Duration::minutes(120));
        assert_eq!(result.observation.deviation_minutes, -120.0);
        assert_eq!(result.info.compliance, 0.0);
        assert_eq!(result.reward, -20.0);
    }

    #[test]
    fn test_partial_reward_band() {
        let mut env = fixed_env(30.0, 5);
        let result = env.step(Action(0.0));

        assert!((result.reward - 5.0).abs() < 1e-9);
        assert_eq!(result.info.compliance, 0.75);
    }

    #[test]
    fn test_doses_advance_by_interval() {
        let mut env = fixed_env(0.0, 5);
        env.step(Action(0.0));
        let second = env.step(Action(0.0));
        assert_eq!(second.info.scheduled_time, anchor() + Duration::hours(24));
    }

    #[test]
    fn test_terminal_stepping_is_noop() {
        let mut env = fixed_env(0.0, 2);
        env.step(Action(0.0));
        let last = env.step(Action(0.0));
        assert!(last.done);
        assert_eq!(
            last.info.termination_reason.as_deref(),
            Some(REASON_LENGTH_REACHED)
        );

        let before = env.state();
        let extra = env.step(Action(60.0));

        assert!(extra.done);
        assert_eq!(extra.reward, 0.0);
        assert_eq!(extra.observation, last.observation);
        assert_eq!(env.state(), before);
    }

    #[test]
    fn test_zero_length_episode_is_terminal() {
        let mut env = fixed_env(0.0, 0);
        assert!(env.is_done());
        let result = env.step(Action(0.0));
        assert!(result.done);
        assert_eq!(result.reward, 0.0);
    }

    #[test]
    fn test_history_window() {
        let mut env = fixed_env(90.0, 10);
        for _ in 0..7 {
            env.step(Action(0.0));
        }
        let state = env.state();
        assert_eq!(state.history.len(), 5);
        assert_eq!(state.observation.history_factor, 0.25);
    }

    #[test]
    fn test_seeded_episodes_are_reproducible() {
        let config = EnvConfig::deterministic(20, anchor());
        let mut a = AdaptiveEnv::new(
            config.clone(),
            SimulatedIntakes::new(SimulatedIntakeConfig::default(), 1),
        );
        let mut b = AdaptiveEnv::new(
            config,
            SimulatedIntakes::new(SimulatedIntakeConfig::default(), 2),
        );

        a.reset(Some(42));
        b.reset(Some(42));

        while !a.is_done() {
            let ra = a.step(Action(15.0));
            let rb = b.step(Action(15.0));
            assert_eq!(ra, rb);
        }
        assert!(b.is_done());
    }
}
