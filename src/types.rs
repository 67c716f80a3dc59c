//! Core types for the dose-cadence engine
//!
//! This module defines the data structures that flow through each stage:
//! domain medications and intake logs, derived compliance records, training
//! sequences, and projected future schedules.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Number of values in an observation vector
pub const OBSERVATION_DIM: usize = 3;

/// Nominal time attached to a schedule slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NominalTime {
    /// A recurring time of day (`HH:MM:SS` in the payload)
    TimeOfDay(NaiveTime),
    /// A single concrete instant (ISO-8601 in the payload)
    Instant(NaiveDateTime),
}

impl NominalTime {
    /// Time-of-day component of the nominal time
    pub fn time_of_day(&self) -> NaiveTime {
        match self {
            NominalTime::TimeOfDay(t) => *t,
            NominalTime::Instant(dt) => dt.time(),
        }
    }

    /// Resolve to an instant, placing a bare time of day on `date`
    pub fn on_date(&self, date: NaiveDate) -> NaiveDateTime {
        match self {
            NominalTime::TimeOfDay(t) => date.and_time(*t),
            NominalTime::Instant(dt) => *dt,
        }
    }

    /// Resolve to the occurrence closest to `reference`.
    ///
    /// Instants resolve to themselves. A time of day is placed on the day
    /// before, the day of, or the day after `reference`, whichever is nearest.
    pub fn nearest_to(&self, reference: NaiveDateTime) -> NaiveDateTime {
        match self {
            NominalTime::Instant(dt) => *dt,
            NominalTime::TimeOfDay(t) => {
                let same_day = reference.date().and_time(*t);
                [
                    same_day - Duration::days(1),
                    same_day,
                    same_day + Duration::days(1),
                ]
                .into_iter()
                .min_by_key(|candidate| (reference - *candidate).num_milliseconds().abs())
                .unwrap_or(same_day)
            }
        }
    }
}

/// A single recorded intake (button press) for a schedule slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeLog {
    pub schedule_id: String,
    pub timestamp: NaiveDateTime,
    pub taken: bool,
}

/// A nominal dosing slot of a medication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: String,
    pub medication_id: String,
    pub nominal: NominalTime,
    /// Logs in arrival order (not necessarily chronological)
    pub intake_logs: Vec<IntakeLog>,
}

/// A medication with its dosing interval and schedule slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub start_date: Option<NaiveDate>,
    /// Nominal duration between successive doses
    #[serde(with = "duration_seconds")]
    pub interval: Option<Duration>,
    pub schedules: Vec<ScheduleSlot>,
}

impl Medication {
    /// Interval expressed as fractional hours
    pub fn interval_hours(&self) -> Option<f64> {
        self.interval
            .map(|d| d.num_milliseconds() as f64 / 3_600_000.0)
    }

    /// Iterate every intake log across all schedule slots
    pub fn all_logs(&self) -> impl Iterator<Item = &IntakeLog> {
        self.schedules.iter().flat_map(|s| s.intake_logs.iter())
    }
}

/// Derived per-intake compliance features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub medication_id: String,
    pub schedule_id: String,
    pub scheduled_time: NaiveDateTime,
    pub actual_time: Option<NaiveDateTime>,
    pub taken: bool,
    /// Hour of day in [0, 24)
    pub hour_of_day: f64,
    /// Signed deviation (actual - scheduled), minutes; absent for missed slots
    pub deviation_minutes: Option<f64>,
    /// Compliance score (0-1)
    pub compliance: f64,
    /// Mean of the last <= 5 compliance scores ending at this record
    pub rolling_compliance: f64,
    /// Compliance of the preceding record (0.5 for the first one)
    pub previous_compliance: f64,
}

/// Policy input: (deviation minutes, compliance history factor, hour of day)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub deviation_minutes: f64,
    pub history_factor: f64,
    pub hour_of_day: f64,
}

impl Observation {
    pub fn new(deviation_minutes: f64, history_factor: f64, hour_of_day: f64) -> Self {
        Self {
            deviation_minutes,
            history_factor,
            hour_of_day,
        }
    }

    /// Neutral starting state: no deviation, unknown history, midday
    pub fn neutral() -> Self {
        Self::new(0.0, 0.5, 12.0)
    }

    pub fn to_array(&self) -> [f64; OBSERVATION_DIM] {
        [self.deviation_minutes, self.history_factor, self.hour_of_day]
    }

    pub fn from_array(values: [f64; OBSERVATION_DIM]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

/// Time shift applied to a reminder, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(pub f64);

impl Action {
    pub fn minutes(&self) -> f64 {
        self.0
    }

    /// Bound the shift to [-max_shift, max_shift]
    pub fn clamped(self, max_shift: f64) -> Self {
        let bound = max_shift.abs();
        Action(self.0.clamp(-bound, bound))
    }
}

/// One (observation, action, reward) step of a training window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub observation: Observation,
    pub action: Action,
    pub reward: f64,
}

/// Fixed-length window of replayed intake behavior for one medication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSequence {
    pub medication_id: String,
    pub steps: Vec<SequenceStep>,
}

/// A single environment transition handed to a policy optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub observation: Observation,
    pub action: Action,
    pub reward: f64,
    pub next_observation: Observation,
    pub done: bool,
}

/// One projected future dose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureScheduleProjection {
    pub schedule_id: String,
    /// Projected time of day (`HH:MM:SS`)
    pub scheduled_time: String,
}

/// Projected dosing cycle of one medication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationProjection {
    pub medication_id: String,
    pub future_schedules: Vec<FutureScheduleProjection>,
}

/// Hour of day as a real number in [0, 24)
pub fn hour_of_day(t: NaiveDateTime) -> f64 {
    t.hour() as f64 + t.minute() as f64 / 60.0 + t.second() as f64 / 3600.0
}

/// Signed difference `later - earlier` in fractional minutes
pub fn minutes_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

/// Duration from fractional minutes, rounded to the millisecond
pub fn duration_from_minutes(minutes: f64) -> Duration {
    Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Duration from fractional hours, rounded to the millisecond
pub fn duration_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.num_milliseconds() as f64 / 1000.0)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        Ok(secs.map(|s| Duration::milliseconds((s * 1000.0).round() as i64)))
    }
}
