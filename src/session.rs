//! Reminder adjustment with a trained policy
//!
//! The session holds the policy explicitly; without one, adjustment requests
//! fail with [`CadenceError::PolicyUnavailable`] and callers fall back to the
//! compensator projections.

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::baseline::NEUTRAL_COMPLIANCE;
use crate::error::CadenceError;
use crate::pipeline::FeatureDataset;
use crate::policy::{Policy, PolicyCheckpoint};
use crate::types::{duration_from_minutes, hour_of_day, Observation};

/// A reminder to adjust
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    pub medication_id: String,
    pub scheduled_time: NaiveDateTime,
}

/// Adjusted reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAdjustment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    pub medication_id: String,
    pub original_time: NaiveDateTime,
    pub adjusted_time: NaiveDateTime,
    pub adjustment_minutes: f64,
}

/// Adjustment context around an optional policy
#[derive(Clone)]
pub struct AdjustmentSession {
    policy: Option<Arc<dyn Policy>>,
    max_time_shift: f64,
}

impl AdjustmentSession {
    /// Session without a policy
    pub fn new(max_time_shift: f64) -> Self {
        Self {
            policy: None,
            max_time_shift,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Session around the policy restored from `checkpoint`
    pub fn from_checkpoint(
        checkpoint: &PolicyCheckpoint,
        max_time_shift: f64,
    ) -> Result<Self, CadenceError> {
        let policy: Arc<dyn Policy> = Arc::from(checkpoint.to_policy()?);
        Ok(Self::new(max_time_shift).with_policy(policy))
    }

    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    /// Adjust one reminder given the medication's past compliance scores
    pub fn adjust(
        &self,
        scheduled: NaiveDateTime,
        history: &[f64],
    ) -> Result<(NaiveDateTime, f64), CadenceError> {
        let policy = self.policy.as_ref().ok_or_else(|| {
            CadenceError::PolicyUnavailable("no trained policy loaded".to_string())
        })?;

        let factor = if history.is_empty() {
            NEUTRAL_COMPLIANCE
        } else {
            history.iter().sum::<f64>() / history.len() as f64
        };
        let observation = Observation::new(0.0, factor, hour_of_day(scheduled));
        let shift = policy
            .act(&observation, true)
            .clamped(self.max_time_shift)
            .minutes();

        debug!("policy {} shifted {} by {:.1} min", policy.version(), scheduled, shift);
        Ok((scheduled + duration_from_minutes(shift), shift))
    }

    /// Adjust every entry using per-medication compliance history
    pub fn adjust_all(
        &self,
        entries: &[ScheduleEntry],
        history: &HashMap<String, Vec<f64>>,
    ) -> Result<Vec<ScheduleAdjustment>, CadenceError> {
        entries
            .iter()
            .map(|entry| {
                let past = history
                    .get(&entry.medication_id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let (adjusted_time, adjustment_minutes) = self.adjust(entry.scheduled_time, past)?;
                Ok(ScheduleAdjustment {
                    schedule_id: entry.schedule_id.clone(),
                    medication_id: entry.medication_id.clone(),
                    original_time: entry.scheduled_time,
                    adjusted_time,
                    adjustment_minutes,
                })
            })
            .collect()
    }
}

/// Compliance scores per medication, in record order
pub fn compliance_history(dataset: &FeatureDataset) -> HashMap<String, Vec<f64>> {
    dataset
        .series
        .iter()
        .map(|s| {
            (
                s.medication_id.clone(),
                s.records.iter().map(|r| r.compliance).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ConstantShiftPolicy, ZeroShiftPolicy};
    use crate::types::Action;
    use chrono::{Duration, NaiveDate};
    use std::sync::Mutex;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    /// Records the observations it is asked about
    struct Spy {
        seen: Mutex<Vec<Observation>>,
    }

    impl Policy for Spy {
        fn version(&self) -> &str {
            "spy"
        }

        fn act(&self, observation: &Observation, _deterministic: bool) -> Action {
            self.seen.lock().unwrap().push(*observation);
            Action(0.0)
        }
    }

    #[test]
    fn test_no_policy_is_unavailable() {
        let session = AdjustmentSession::new(120.0);
        assert!(!session.has_policy());
        assert!(matches!(
            session.adjust(at(8, 0), &[]),
            Err(CadenceError::PolicyUnavailable(_))
        ));
    }

    #[test]
    fn test_observation_shape() {
        let spy = Arc::new(Spy {
            seen: Mutex::new(Vec::new()),
        });
        let session = AdjustmentSession::new(120.0).with_policy(spy.clone());

        session.adjust(at(20, 30), &[1.0, 0.0, 0.5, 0.5]).unwrap();
        session.adjust(at(8, 0), &[]).unwrap();

        let seen = spy.seen.lock().unwrap();
        assert_eq!(seen[0], Observation::new(0.0, 0.5, 20.5));
        assert_eq!(seen[1], Observation::new(0.0, 0.5, 8.0));
    }

    #[test]
    fn test_shift_applied_and_clamped() {
        let session =
            AdjustmentSession::new(60.0).with_policy(Arc::new(ConstantShiftPolicy::new(-90.0)));
        let (adjusted, shift) = session.adjust(at(9, 0), &[1.0]).unwrap();
        assert_eq!(shift, -60.0);
        assert_eq!(adjusted, at(9, 0) - Duration::minutes(60));
    }

    #[test]
    fn test_adjust_all() {
        let session = AdjustmentSession::new(120.0).with_policy(Arc::new(ZeroShiftPolicy));
        let entries = vec![
            ScheduleEntry {
                schedule_id: Some("s1".to_string()),
                medication_id: "med_0".to_string(),
                scheduled_time: at(8, 0),
            },
            ScheduleEntry {
                schedule_id: None,
                medication_id: "med_1".to_string(),
                scheduled_time: at(21, 0),
            },
        ];
        let mut history = HashMap::new();
        history.insert("med_0".to_string(), vec![1.0, 1.0]);

        let adjustments = session.adjust_all(&entries, &history).unwrap();
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].schedule_id.as_deref(), Some("s1"));
        assert_eq!(adjustments[1].original_time, at(21, 0));
        assert_eq!(adjustments[1].adjusted_time, at(21, 0));
        assert_eq!(adjustments[1].adjustment_minutes, 0.0);
    }
}
