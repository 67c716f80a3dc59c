//! Engine configuration
//!
//! All sections are defaulted, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! { "environment": { "max_time_shift": 90.0 }, "training": { "total_timesteps": 5000 } }
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CadenceError;
use crate::features::RewardShape;
use crate::sequence::DEFAULT_SEQUENCE_LENGTH;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub pipeline: PipelineConfig,
    pub environment: EnvConfig,
    pub training: TrainingConfig,
}

impl CadenceConfig {
    /// Load a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, CadenceError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, CadenceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Feature pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records per training window
    pub sequence_length: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
        }
    }
}

/// Decision environment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Largest reminder shift, minutes (either direction)
    pub max_time_shift: f64,
    /// Reward for an intake within 15 minutes of the reminder
    pub reward_on_time: f64,
    /// Penalty at a two hour deviation (negative)
    pub penalty_missed: f64,
    /// Steps per episode
    pub episode_length: u32,
    /// Hours between consecutive doses inside an episode
    pub dose_interval_hours: f64,
    /// Fixed scheduled time for the first dose of every episode
    pub episode_anchor: Option<NaiveDateTime>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        let shape = RewardShape::default();
        Self {
            max_time_shift: 120.0,
            reward_on_time: shape.reward_on_time,
            penalty_missed: shape.penalty_missed,
            episode_length: 100,
            dose_interval_hours: 24.0,
            episode_anchor: None,
        }
    }
}

impl EnvConfig {
    pub fn reward_shape(&self) -> RewardShape {
        RewardShape {
            reward_on_time: self.reward_on_time,
            penalty_missed: self.penalty_missed,
        }
    }

    /// Short episodes with a fixed anchor, for tests and evaluation
    pub fn deterministic(episode_length: u32, anchor: NaiveDateTime) -> Self {
        Self {
            episode_length,
            episode_anchor: Some(anchor),
            ..Self::default()
        }
    }
}

/// Policy optimizer and training job settings.
///
/// Optimizer hyperparameters are passed through to whichever
/// [`PolicyOptimizer`](crate::policy::PolicyOptimizer) is plugged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Environment steps between `improve()` calls
    pub n_steps: u64,
    /// Entropy coefficient
    pub ent_coef: f64,
    /// Environment steps for a whole training run
    pub total_timesteps: u64,
    /// Episodes used when evaluating a trained policy
    pub eval_episodes: u32,
    /// Seed for simulated intake sources
    pub seed: u64,
    /// Directory receiving checkpoints
    pub checkpoint_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.0003,
            gamma: 0.99,
            n_steps: 2048,
            ent_coef: 0.01,
            total_timesteps: 100_000,
            eval_episodes: 10,
            seed: 42,
            checkpoint_dir: PathBuf::from("models"),
        }
    }
}

impl TrainingConfig {
    /// Default checkpoint location inside `checkpoint_dir`
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir.join("cadence_policy.json")
    }
}
