//! Dose Cadence - Adaptive medication reminder timing engine
//!
//! Cadence learns from a user's intake history how to move reminder times so
//! that real intake lines up with the intended dosing cycle:
//! payload validation → compliance features → training sequences →
//! reminder-timing environment and policies.
//!
//! Independently of any learned policy, the cycle offset compensator projects
//! the next doses of each medication from the average observed phase offset.
//!
//! ## Modules
//!
//! - **Pipeline**: Process medication payloads into compliance series, training
//!   windows and projected schedules
//! - **Environment / Policy / Training**: Learn and evaluate reminder shifts
//! - **Session**: Adjust reminders with a trained policy

pub mod baseline;
pub mod compensator;
pub mod config;
pub mod env;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod policy;
pub mod schema;
pub mod sequence;
pub mod session;
pub mod store;
pub mod synthetic;
pub mod training;
pub mod types;

pub use compensator::{project_medication, project_medications, ProjectionBatch};
pub use config::{CadenceConfig, EnvConfig, PipelineConfig, TrainingConfig};
pub use env::{AdaptiveEnv, Environment, StepResult};
pub use error::{CadenceError, RecordIssue};
pub use pipeline::{
    process_payload, CadenceProcessor, CompliancePipeline, FeatureDataset, ProcessOutput,
};
pub use policy::{Policy, PolicyCheckpoint, PolicyOptimizer};
pub use sequence::SequenceBuilder;
pub use session::AdjustmentSession;
pub use training::{evaluate_policy, TrainingHandle, TrainingJob};

/// Cadence version reported by the CLI
pub const CADENCE_VERSION: &str = env!("CARGO_PKG_VERSION");
