//! Training sequence builder
//!
//! Slices each medication's compliance series into fixed-length sliding
//! windows of (observation, action, reward) steps for offline replay.

use log::{debug, warn};

use crate::pipeline::FeatureDataset;
use crate::types::{
    duration_from_minutes, minutes_between, Action, ComplianceRecord, Observation, SequenceStep,
    TrainingSequence,
};

/// Default number of records per window
pub const DEFAULT_SEQUENCE_LENGTH: usize = 10;

/// Shortest window that still yields one replay step
pub const MIN_SEQUENCE_LENGTH: usize = 2;

/// Scale from next-record compliance to replay reward
pub const REPLAY_REWARD_SCALE: f64 = 10.0;

/// Builder for sliding training windows
#[derive(Debug, Clone, Copy)]
pub struct SequenceBuilder {
    window: usize,
}

impl Default for SequenceBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_LENGTH)
    }
}

impl SequenceBuilder {
    /// Create a builder with window length `window` (at least 2 records)
    pub fn new(window: usize) -> Self {
        if window < MIN_SEQUENCE_LENGTH {
            warn!(
                "sequence length {} is too short, using {}",
                window, MIN_SEQUENCE_LENGTH
            );
        }
        Self {
            window: window.max(MIN_SEQUENCE_LENGTH),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Build windows for every medication in the dataset.
    ///
    /// Records without a deviation (missed slots) carry no timing signal and
    /// are dropped first. Medications with fewer usable records than the
    /// window produce nothing.
    pub fn build(&self, dataset: &FeatureDataset) -> Vec<TrainingSequence> {
        let mut sequences = Vec::new();

        for series in &dataset.series {
            let usable: Vec<&ComplianceRecord> = series
                .records
                .iter()
                .filter(|r| r.deviation_minutes.is_some())
                .collect();

            if usable.len() < self.window {
                debug!(
                    "medication {}: {} usable records, window {}; no sequences",
                    series.medication_id,
                    usable.len(),
                    self.window
                );
                continue;
            }

            for window in usable.windows(self.window) {
                sequences.push(TrainingSequence {
                    medication_id: series.medication_id.clone(),
                    steps: window.windows(2).map(|pair| replay_step(pair[0], pair[1])).collect(),
                });
            }
        }

        sequences
    }
}

/// Replay step for an adjacent (current, next) pair
fn replay_step(current: &ComplianceRecord, next: &ComplianceRecord) -> SequenceStep {
    let deviation = current.deviation_minutes.unwrap_or(0.0);
    let realized = current.scheduled_time + duration_from_minutes(deviation);

    SequenceStep {
        observation: Observation::new(deviation, current.rolling_compliance, current.hour_of_day),
        action: Action(minutes_between(realized, next.scheduled_time)),
        reward: next.compliance * REPLAY_REWARD_SCALE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MedicationSeries;
    use chrono::{Duration, NaiveDate};

    fn record(day: u32, deviation: Option<f64>, compliance: f64) -> ComplianceRecord {
        let scheduled = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        ComplianceRecord {
            medication_id: "med".to_string(),
            schedule_id: "s1".to_string(),
            scheduled_time: scheduled,
            actual_time: deviation.map(|d| scheduled + Duration::minutes(d as i64)),
            taken: deviation.is_some(),
            hour_of_day: 8.0,
            deviation_minutes: deviation,
            compliance,
            rolling_compliance: 0.8,
            previous_compliance: 0.5,
        }
    }

    fn dataset(records: Vec<ComplianceRecord>) -> FeatureDataset {
        FeatureDataset {
            series: vec![MedicationSeries {
                medication_id: "med".to_string(),
                records,
            }],
            issues: vec![],
        }
    }

    #[test]
    fn test_window_count() {
        let records = (1..=12).map(|d| record(d, Some(5.0), 1.0)).collect();
        let sequences = SequenceBuilder::new(10).build(&dataset(records));

        // 12 - 10 + 1 windows, each with 9 adjacent pairs
        assert_eq!(sequences.len(), 3);
        assert!(sequences.iter().all(|s| s.steps.len() == 9));
    }

    #[test]
    fn test_too_short_window_is_raised() {
        assert_eq!(SequenceBuilder::new(0).window(), MIN_SEQUENCE_LENGTH);
        assert_eq!(SequenceBuilder::new(1).window(), MIN_SEQUENCE_LENGTH);

        let records = (1..=3).map(|d| record(d, Some(5.0), 1.0)).collect();
        let sequences = SequenceBuilder::new(1).build(&dataset(records));
        assert_eq!(sequences.len(), 2);
        assert!(sequences.iter().all(|s| s.steps.len() == 1));
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let records = (1..=9).map(|d| record(d, Some(5.0), 1.0)).collect();
        assert!(SequenceBuilder::default().build(&dataset(records)).is_empty());
    }

    #[test]
    fn test_missed_records_are_dropped() {
        let mut records: Vec<_> = (1..=10).map(|d| record(d, Some(0.0), 1.0)).collect();
        records[4] = record(5, None, 0.0);
        // Only 9 usable records remain
        assert!(SequenceBuilder::new(10).build(&dataset(records)).is_empty());
    }

    #[test]
    fn test_step_contents() {
        let records = vec![record(1, Some(30.0), 1.0), record(2, Some(-10.0), 0.5)];
        let sequences = SequenceBuilder::new(2).build(&dataset(records));
        assert_eq!(sequences.len(), 1);

        let step = &sequences[0].steps[0];
        assert_eq!(step.observation, Observation::new(30.0, 0.8, 8.0));
        // Realized 08:30 on day one, next scheduled 08:00 on day two
        assert_eq!(step.action, Action(23.5 * 60.0));
        assert_eq!(step.reward, 5.0);
    }

    #[test]
    fn test_daily_gap_action() {
        let records: Vec<_> = (1..=5).map(|d| record(d, Some(0.0), 1.0)).collect();
        let sequences = SequenceBuilder::new(5).build(&dataset(records));
        for step in &sequences[0].steps {
            assert_eq!(step.action, Action(24.0 * 60.0));
        }
    }
}
