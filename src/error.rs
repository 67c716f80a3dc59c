//! Error types for dose-cadence

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ValidationError;

/// Errors that can occur while processing intake history or adjusting schedules
#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Data error: {0}")]
    Data(String),

    #[error("No policy available: {0}")]
    PolicyUnavailable(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Training failed: {0}")]
    Training(String),
}

impl CadenceError {
    pub fn data(msg: impl Into<String>) -> Self {
        CadenceError::Data(msg.into())
    }
}

/// A per-record failure collected alongside successful results.
///
/// Data errors never abort a batch; the offending medication, slot or log is
/// skipped and described here instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub medication_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    pub reason: String,
}

impl RecordIssue {
    pub fn new(
        medication_id: impl Into<String>,
        schedule_id: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            medication_id: medication_id.into(),
            schedule_id: schedule_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}
