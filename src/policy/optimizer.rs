//! Policy optimizers and checkpoints

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConstantShiftPolicy, Policy, ZeroShiftPolicy};
use crate::config::TrainingConfig;
use crate::error::CadenceError;
use crate::types::{Action, Observation, Transition, TrainingSequence};

/// Checkpoint kind reconstructed as [`ZeroShiftPolicy`]
pub const KIND_ZERO_SHIFT: &str = "zero_shift";

/// Checkpoint kind reconstructed as [`ConstantShiftPolicy`]
pub const KIND_CONSTANT_SHIFT: &str = "constant_shift";

/// Learns a policy from transitions.
///
/// Optimizers are driven by a training job: `observe` every transition, `act`
/// to pick exploratory actions, and `improve` periodically to produce an
/// updated checkpoint.
pub trait PolicyOptimizer: Send {
    /// Record one transition
    fn observe(&mut self, transition: &Transition);

    /// Choose an action during training
    fn act(&mut self, observation: &Observation) -> Action;

    /// Update the policy from what has been observed so far
    fn improve(&mut self) -> Result<PolicyCheckpoint, CadenceError>;

    /// Replay an offline training window as a chain of transitions.
    ///
    /// Each step's successor observation is the next step's observation; the
    /// last step is terminal.
    fn ingest_sequence(&mut self, sequence: &TrainingSequence) {
        let steps = &sequence.steps;
        for (i, step) in steps.iter().enumerate() {
            let next = steps.get(i + 1);
            self.observe(&Transition {
                observation: step.observation,
                action: step.action,
                reward: step.reward,
                next_observation: next.map(|n| n.observation).unwrap_or(step.observation),
                done: next.is_none(),
            });
        }
    }
}

/// Optimizer hyperparameters recorded in checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub gamma: f64,
    pub n_steps: u64,
    pub ent_coef: f64,
}

impl From<&TrainingConfig> for Hyperparameters {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            gamma: config.gamma,
            n_steps: config.n_steps,
            ent_coef: config.ent_coef,
        }
    }
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self::from(&TrainingConfig::default())
    }
}

/// Running statistics of observed transitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub transitions: u64,
    /// Completed episodes (terminal transitions)
    pub episodes: u64,
    pub total_reward: f64,
    /// Sum of discounted returns of completed episodes
    pub total_discounted_return: f64,
    /// Number of `improve` calls
    pub updates: u64,
}

impl OptimizerStats {
    /// Mean reward per transition
    pub fn mean_reward(&self) -> f64 {
        if self.transitions == 0 {
            0.0
        } else {
            self.total_reward / self.transitions as f64
        }
    }

    /// Mean discounted return per completed episode
    pub fn mean_discounted_return(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_discounted_return / self.episodes as f64
        }
    }
}

/// Serialized result of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCheckpoint {
    /// Which policy family this checkpoint reconstructs
    pub kind: String,
    /// Version of the optimizer that produced it
    pub version: String,
    pub created_at: DateTime<Utc>,
    /// Learned constant shift (constant-shift kinds only)
    #[serde(default)]
    pub shift_minutes: f64,
    pub hyperparameters: Hyperparameters,
    pub stats: OptimizerStats,
    /// Training job that produced this checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl PolicyCheckpoint {
    /// Rebuild the policy this checkpoint describes
    pub fn to_policy(&self) -> Result<Box<dyn Policy>, CadenceError> {
        match self.kind.as_str() {
            KIND_ZERO_SHIFT => Ok(Box::new(ZeroShiftPolicy)),
            KIND_CONSTANT_SHIFT => Ok(Box::new(ConstantShiftPolicy::new(self.shift_minutes))),
            other => Err(CadenceError::PolicyUnavailable(format!(
                "unknown policy kind '{}' in checkpoint",
                other
            ))),
        }
    }
}

/// Baseline optimizer version
pub const BASELINE_OPTIMIZER_VERSION: &str = "baseline-optimizer-v1";

/// Optimizer that always proposes a zero shift.
///
/// It learns nothing; it tracks reward statistics so that trained policies
/// have a reference to be compared against.
#[derive(Debug, Clone)]
pub struct BaselineOptimizer {
    hyperparameters: Hyperparameters,
    stats: OptimizerStats,
    episode_return: f64,
    episode_discount: f64,
}

impl Default for BaselineOptimizer {
    fn default() -> Self {
        Self::new(Hyperparameters::default())
    }
}

impl BaselineOptimizer {
    pub fn new(hyperparameters: Hyperparameters) -> Self {
        Self {
            hyperparameters,
            stats: OptimizerStats::default(),
            episode_return: 0.0,
            episode_discount: 1.0,
        }
    }

    pub fn stats(&self) -> &OptimizerStats {
        &self.stats
    }
}

impl PolicyOptimizer for BaselineOptimizer {
    fn observe(&mut self, transition: &Transition) {
        self.stats.transitions += 1;
        self.stats.total_reward += transition.reward;
        self.episode_return += self.episode_discount * transition.reward;
        self.episode_discount *= self.hyperparameters.gamma;

        if transition.done {
            self.stats.episodes += 1;
            self.stats.total_discounted_return += self.episode_return;
            self.episode_return = 0.0;
            self.episode_discount = 1.0;
        }
    }

    fn act(&mut self, _observation: &Observation) -> Action {
        Action(0.0)
    }

    fn improve(&mut self) -> Result<PolicyCheckpoint, CadenceError> {
        if !self.stats.total_reward.is_finite() {
            return Err(CadenceError::Training(
                "reward statistics are not finite".to_string(),
            ));
        }
        self.stats.updates += 1;
        debug!(
            "baseline update {}: {} transitions, mean reward {:.3}",
            self.stats.updates,
            self.stats.transitions,
            self.stats.mean_reward()
        );

        Ok(PolicyCheckpoint {
            kind: KIND_ZERO_SHIFT.to_string(),
            version: BASELINE_OPTIMIZER_VERSION.to_string(),
            created_at: Utc::now(),
            shift_minutes: 0.0,
            hyperparameters: self.hyperparameters,
            stats: self.stats.clone(),
            job_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SequenceStep;

    fn step(deviation: f64, reward: f64) -> SequenceStep {
        SequenceStep {
            observation: Observation::new(deviation, 0.5, 8.0),
            action: Action(0.0),
            reward,
        }
    }

    #[test]
    fn test_ingest_sequence_chains_observations() {
        struct Recorder(Vec<Transition>);
        impl PolicyOptimizer for Recorder {
            fn observe(&mut self, transition: &Transition) {
                self.0.push(transition.clone());
            }
            fn act(&mut self, _observation: &Observation) -> Action {
                Action(0.0)
            }
            fn improve(&mut self) -> Result<PolicyCheckpoint, CadenceError> {
                Err(CadenceError::Training("unused".to_string()))
            }
        }

        let sequence = TrainingSequence {
            medication_id: "med".to_string(),
            steps: vec![step(1.0, 10.0), step(2.0, 5.0), step(3.0, 0.0)],
        };
        let mut recorder = Recorder(Vec::new());
        recorder.ingest_sequence(&sequence);

        let transitions = recorder.0;
        assert_eq!(transitions.len(), 3);
        assert_eq!(transitions[0].next_observation.deviation_minutes, 2.0);
        assert_eq!(transitions[1].next_observation.deviation_minutes, 3.0);
        assert!(!transitions[1].done);
        assert!(transitions[2].done);
    }

    #[test]
    fn test_baseline_stats() {
        let mut optimizer = BaselineOptimizer::new(Hyperparameters {
            gamma: 0.5,
            ..Hyperparameters::default()
        });
        optimizer.ingest_sequence(&TrainingSequence {
            medication_id: "med".to_string(),
            steps: vec![step(0.0, 10.0), step(0.0, 4.0)],
        });

        let stats = optimizer.stats();
        assert_eq!(stats.transitions, 2);
        assert_eq!(stats.episodes, 1);
        assert_eq!(stats.mean_reward(), 7.0);
        // 10 + 0.5 * 4
        assert_eq!(stats.mean_discounted_return(), 12.0);
        assert_eq!(optimizer.act(&Observation::neutral()), Action(0.0));
    }

    #[test]
    fn test_baseline_checkpoint_restores_zero_shift() {
        let mut optimizer = BaselineOptimizer::default();
        let checkpoint = optimizer.improve().unwrap();

        assert_eq!(checkpoint.kind, KIND_ZERO_SHIFT);
        assert_eq!(checkpoint.stats.updates, 1);
        let policy = checkpoint.to_policy().unwrap();
        assert_eq!(policy.act(&Observation::neutral(), true), Action(0.0));
    }

    #[test]
    fn test_constant_checkpoint() {
        let mut checkpoint = BaselineOptimizer::default().improve().unwrap();
        checkpoint.kind = KIND_CONSTANT_SHIFT.to_string();
        checkpoint.shift_minutes = 15.0;

        let policy = checkpoint.to_policy().unwrap();
        assert_eq!(policy.act(&Observation::neutral(), true), Action(15.0));
    }

    #[test]
    fn test_unknown_kind_is_unavailable() {
        let mut checkpoint = BaselineOptimizer::default().improve().unwrap();
        checkpoint.kind = "ppo".to_string();

        assert!(matches!(
            checkpoint.to_policy(),
            Err(CadenceError::PolicyUnavailable(_))
        ));
    }
}
