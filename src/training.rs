//! Background policy training
//!
//! A [`TrainingJob`] owns an environment and an optimizer and runs on its own
//! thread:
//! 1. replay offline training sequences into the optimizer
//! 2. run environment episodes until the timestep budget is spent, improving
//!    every `n_steps`
//! 3. write the final checkpoint atomically
//!
//! The caller keeps a [`TrainingHandle`] to poll status, cancel, or wait.
//! Cancellation is honored at episode boundaries and persists nothing.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::config::TrainingConfig;
use crate::env::Environment;
use crate::error::CadenceError;
use crate::policy::{Policy, PolicyCheckpoint, PolicyOptimizer};
use crate::store;
use crate::types::{TrainingSequence, Transition};

/// Lifecycle of a training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running { timesteps: u64 },
    Completed { timesteps: u64 },
    Cancelled { timesteps: u64 },
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Cancelled { .. } | JobStatus::Failed { .. }
        )
    }
}

/// Outcome of a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub timesteps: u64,
    pub episodes: u64,
    pub sequences_replayed: usize,
    /// Final checkpoint (completed jobs only)
    pub checkpoint: Option<PolicyCheckpoint>,
    /// Where the checkpoint was written, if anywhere
    pub checkpoint_path: Option<PathBuf>,
}

/// A configured, not yet started, training run
pub struct TrainingJob<E, O> {
    config: TrainingConfig,
    env: E,
    optimizer: O,
    sequences: Vec<TrainingSequence>,
    checkpoint_path: Option<PathBuf>,
}

impl<E, O> TrainingJob<E, O>
where
    E: Environment + Send + 'static,
    O: PolicyOptimizer + 'static,
{
    /// Create a job writing its checkpoint to `config.checkpoint_path()`
    pub fn new(config: TrainingConfig, env: E, optimizer: O) -> Self {
        let checkpoint_path = Some(config.checkpoint_path());
        Self {
            config,
            env,
            optimizer,
            sequences: Vec::new(),
            checkpoint_path,
        }
    }

    /// Offline sequences replayed before any environment step
    pub fn with_sequences(mut self, sequences: Vec<TrainingSequence>) -> Self {
        self.sequences = sequences;
        self
    }

    /// Override (or with `None`, disable) checkpoint persistence
    pub fn with_checkpoint_path(mut self, path: Option<PathBuf>) -> Self {
        self.checkpoint_path = path;
        self
    }

    /// Start the job on a background thread
    pub fn spawn(self) -> TrainingHandle {
        let job_id = Uuid::new_v4();
        let status = Arc::new(Mutex::new(JobStatus::Pending));
        let cancel = Arc::new(AtomicBool::new(false));

        let ctx = JobContext {
            job_id,
            status: Arc::clone(&status),
            cancel: Arc::clone(&cancel),
        };
        let thread = thread::spawn(move || {
            let result = self.run(&ctx);
            if let Err(e) = &result {
                warn!("training job {} failed: {}", ctx.job_id, e);
                ctx.set_status(JobStatus::Failed {
                    reason: e.to_string(),
                });
            }
            result
        });

        TrainingHandle {
            job_id,
            status,
            cancel,
            thread: Some(thread),
        }
    }

    fn run(mut self, ctx: &JobContext) -> Result<TrainingReport, CadenceError> {
        ctx.set_status(JobStatus::Running { timesteps: 0 });
        info!(
            "training job {} started: {} sequences, {} timesteps",
            ctx.job_id,
            self.sequences.len(),
            self.config.total_timesteps
        );

        // Stage 1: offline replay
        for sequence in &self.sequences {
            self.optimizer.ingest_sequence(sequence);
        }

        // Stage 2: environment episodes
        let n_steps = self.config.n_steps.max(1);
        let mut timesteps = 0u64;
        let mut since_improve = 0u64;
        let mut episodes = 0u64;

        while timesteps < self.config.total_timesteps {
            if ctx.cancel.load(Ordering::SeqCst) {
                info!("training job {} cancelled after {} timesteps", ctx.job_id, timesteps);
                ctx.set_status(JobStatus::Cancelled { timesteps });
                return Ok(TrainingReport {
                    job_id: ctx.job_id,
                    status: JobStatus::Cancelled { timesteps },
                    timesteps,
                    episodes,
                    sequences_replayed: self.sequences.len(),
                    checkpoint: None,
                    checkpoint_path: None,
                });
            }

            let mut observation = self.env.reset(Some(self.config.seed.wrapping_add(episodes)));
            if self.env.is_done() {
                return Err(CadenceError::Training(
                    "environment is terminal right after reset".to_string(),
                ));
            }

            while !self.env.is_done() && timesteps < self.config.total_timesteps {
                let action = self.optimizer.act(&observation);
                let result = self.env.step(action);
                self.optimizer.observe(&Transition {
                    observation,
                    action,
                    reward: result.reward,
                    next_observation: result.observation,
                    done: result.done,
                });
                observation = result.observation;
                timesteps += 1;
                since_improve += 1;

                if since_improve >= n_steps {
                    self.optimizer.improve()?;
                    since_improve = 0;
                }
            }

            episodes += 1;
            ctx.set_status(JobStatus::Running { timesteps });
        }

        // Stage 3: final checkpoint
        let mut checkpoint = self.optimizer.improve()?;
        checkpoint.job_id = Some(ctx.job_id);
        if let Some(path) = &self.checkpoint_path {
            store::save_checkpoint(path, &checkpoint)?;
            info!("checkpoint written to {}", path.display());
        }

        ctx.set_status(JobStatus::Completed { timesteps });
        info!(
            "training job {} completed: {} timesteps over {} episodes",
            ctx.job_id, timesteps, episodes
        );

        Ok(TrainingReport {
            job_id: ctx.job_id,
            status: JobStatus::Completed { timesteps },
            timesteps,
            episodes,
            sequences_replayed: self.sequences.len(),
            checkpoint: Some(checkpoint),
            checkpoint_path: self.checkpoint_path,
        })
    }
}

struct JobContext {
    job_id: Uuid,
    status: Arc<Mutex<JobStatus>>,
    cancel: Arc<AtomicBool>,
}

impl JobContext {
    fn set_status(&self, status: JobStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }
}

/// Handle to a running training job
pub struct TrainingHandle {
    job_id: Uuid,
    status: Arc<Mutex<JobStatus>>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<TrainingReport, CadenceError>>>,
}

impl TrainingHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn status(&self) -> JobStatus {
        match self.status.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => JobStatus::Failed {
                reason: "status lock poisoned".to_string(),
            },
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    /// Ask the job to stop at the next episode boundary
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Block until the job finishes
    pub fn wait(mut self) -> Result<TrainingReport, CadenceError> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| CadenceError::Training("job already joined".to_string()))?;
        thread
            .join()
            .map_err(|_| CadenceError::Training("training thread panicked".to_string()))?
    }
}

/// Mean and spread of episode rewards
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub episodes: u32,
    pub mean_reward: f64,
    /// Population standard deviation of episode rewards
    pub std_reward: f64,
}

/// Run `episodes` full episodes with deterministic actions.
///
/// With a `seed`, episode `i` is reset with `seed + i`.
pub fn evaluate_policy<E: Environment + ?Sized>(
    policy: &dyn Policy,
    env: &mut E,
    episodes: u32,
    seed: Option<u64>,
) -> Result<EvaluationSummary, CadenceError> {
    if episodes == 0 {
        return Err(CadenceError::Training(
            "evaluation needs at least one episode".to_string(),
        ));
    }

    let mut rewards = Vec::with_capacity(episodes as usize);
    for i in 0..episodes {
        let mut observation = env.reset(seed.map(|s| s.wrapping_add(i as u64)));
        let mut total = 0.0;
        while !env.is_done() {
            let result = env.step(policy.act(&observation, true));
            total += result.reward;
            observation = result.observation;
        }
        rewards.push(total);
    }

    let n = rewards.len() as f64;
    let mean = rewards.iter().sum::<f64>() / n;
    let variance = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    Ok(EvaluationSummary {
        episodes,
        mean_reward: mean,
        std_reward: variance.sqrt(),
    })
}
