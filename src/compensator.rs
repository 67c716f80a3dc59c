//! Cycle offset compensation
//!
//! Projects one day of future doses per medication by shifting the nominal
//! interval grid by the average phase offset observed in the intake logs.
//! Deterministic and independent of any trained policy.
//!
//! Pipeline per medication:
//! 1. interval and doses per day
//! 2. base instant from the first schedule slot
//! 3. per-log deviation from its expected cycle instant
//! 4. anchor at the latest intake, projected forward

use chrono::{NaiveDateTime, Timelike};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, RecordIssue};
use crate::types::{
    duration_from_hours, FutureScheduleProjection, Medication, MedicationProjection, NominalTime,
};

/// Projected time-of-day format
pub const PROJECTION_TIME_FORMAT: &str = "%H:%M:%S";

/// Projections of a batch of medications plus the per-medication failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectionBatch {
    pub projections: Vec<MedicationProjection>,
    pub issues: Vec<RecordIssue>,
}

/// Project the next dosing cycle of every medication.
///
/// Medications are independent: a failure yields an empty projection for that
/// medication and an issue, and the others proceed.
pub fn project_medications(medications: &[Medication]) -> ProjectionBatch {
    let mut batch = ProjectionBatch::default();

    for medication in medications {
        let future_schedules = match project_medication(medication) {
            Ok(schedules) => schedules,
            Err(e) => {
                warn!("medication {}: projection failed: {}", medication.id, e);
                batch
                    .issues
                    .push(RecordIssue::new(&medication.id, None, e.to_string()));
                Vec::new()
            }
        };
        batch.projections.push(MedicationProjection {
            medication_id: medication.id.clone(),
            future_schedules,
        });
    }

    batch
}

/// Project the next `floor(24 / interval_hours)` doses of one medication.
///
/// # Arguments
/// * `medication` - Medication with interval, start date and logged slots
///
/// # Returns
/// Projected doses in order, or an empty list when there is nothing to
/// project (no interval, no slots, no way to place the base instant)
///
/// # Errors
/// `CadenceError::Data` when the interval is not positive
///
/// # Example
/// ```ignore
/// let schedules = project_medication(&medication)?;
/// ```
pub fn project_medication(
    medication: &Medication,
) -> Result<Vec<FutureScheduleProjection>, CadenceError> {
    // Step 1: interval
    let Some(interval_hours) = medication.interval_hours() else {
        debug!("medication {}: no interval, nothing to project", medication.id);
        return Ok(Vec::new());
    };
    if interval_hours <= 0.0 {
        return Err(CadenceError::data(format!(
            "interval must be positive, got {} hours",
            interval_hours
        )));
    }
    let takes_per_day = (24.0 / interval_hours).floor() as usize;

    // Step 2: base instant
    let Some(first_slot) = medication.schedules.first() else {
        return Ok(Vec::new());
    };
    let base = match (&first_slot.nominal, medication.start_date) {
        (NominalTime::Instant(instant), _) => *instant,
        (nominal, Some(date)) => nominal.on_date(date),
        (NominalTime::TimeOfDay(_), None) => {
            debug!("medication {}: no start date to place the base time", medication.id);
            return Ok(Vec::new());
        }
    };

    // Step 3: mean phase offset
    let avg_adjustment = mean_phase_offset(medication, base, interval_hours);

    // Step 4: project from the latest intake (or the base itself)
    let anchor = medication
        .all_logs()
        .map(|log| log.timestamp)
        .max()
        .unwrap_or(base);
    let start = anchor + duration_from_hours(avg_adjustment);
    let slots = medication.schedules.len();

    let projections = (0..takes_per_day)
        .map(|i| {
            let time = start + duration_from_hours(i as f64 * interval_hours);
            FutureScheduleProjection {
                schedule_id: medication.schedules[i % slots].id.clone(),
                scheduled_time: format_time_of_day(time),
            }
        })
        .collect();

    Ok(projections)
}

/// Mean deviation in hours of every log from its expected cycle instant
fn mean_phase_offset(medication: &Medication, base: NaiveDateTime, interval_hours: f64) -> f64 {
    let deviations: Vec<f64> = medication
        .all_logs()
        .map(|log| {
            let elapsed = hours_between(base, log.timestamp);
            let cycle = (elapsed / interval_hours).floor().max(0.0);
            let expected = base + duration_from_hours(cycle * interval_hours);
            hours_between(expected, log.timestamp)
        })
        .collect();

    if deviations.is_empty() {
        0.0
    } else {
        deviations.iter().sum::<f64>() / deviations.len() as f64
    }
}

fn hours_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}

fn format_time_of_day(t: NaiveDateTime) -> String {
    t.with_nanosecond(0)
        .unwrap_or(t)
        .format(PROJECTION_TIME_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntakeLog, ScheduleSlot};
    use chrono::{Duration, NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn slot(id: &str, h: u32, logs: &[&str]) -> ScheduleSlot {
        ScheduleSlot {
            id: id.to_string(),
            medication_id: "med".to_string(),
            nominal: NominalTime::TimeOfDay(NaiveTime::from_hms_opt(h, 0, 0).unwrap()),
            intake_logs: logs
                .iter()
                .map(|ts| IntakeLog {
                    schedule_id: id.to_string(),
                    timestamp: at(ts),
                    taken: true,
                })
                .collect(),
        }
    }

    fn medication(interval_hours: Option<i64>, schedules: Vec<ScheduleSlot>) -> Medication {
        Medication {
            id: "med".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            interval: interval_hours.map(Duration::hours),
            schedules,
        }
    }

    fn times(schedules: &[FutureScheduleProjection]) -> Vec<&str> {
        schedules.iter().map(|s| s.scheduled_time.as_str()).collect()
    }

    #[test]
    fn test_six_hour_scenario() {
        let med = medication(
            Some(6),
            vec![slot("s1", 8, &["2024-01-01 08:10:00", "2024-01-01 14:05:00"])],
        );

        let schedules = project_medication(&med).unwrap();

        // Mean offset +7.5 min, anchored on the 14:05 intake
        assert_eq!(
            times(&schedules),
            vec!["14:12:30", "20:12:30", "02:12:30", "08:12:30"]
        );
        assert!(schedules.iter().all(|s| s.schedule_id == "s1"));
    }

    #[test]
    fn test_no_history_uses_start_date() {
        let med = medication(Some(8), vec![slot("s1", 9, &[])]);
        let schedules = project_medication(&med).unwrap();
        assert_eq!(times(&schedules), vec!["09:00:00", "17:00:00", "01:00:00"]);
    }

    #[test]
    fn test_round_robin_slots() {
        let med = medication(
            Some(8),
            vec![slot("a", 8, &[]), slot("b", 16, &[])],
        );
        let ids: Vec<String> = project_medication(&med)
            .unwrap()
            .into_iter()
            .map(|s| s.schedule_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_logs_before_base_count_as_cycle_zero() {
        // 07:30 is before the 08:00 base: deviation -30 min
        let med = medication(Some(12), vec![slot("s1", 8, &["2024-01-01 07:30:00"])]);
        let schedules = project_medication(&med).unwrap();
        assert_eq!(times(&schedules), vec!["07:00:00", "19:00:00"]);
    }

    #[test]
    fn test_missing_inputs_project_nothing() {
        assert!(project_medication(&medication(None, vec![slot("s1", 8, &[])]))
            .unwrap()
            .is_empty());
        assert!(project_medication(&medication(Some(6), vec![])).unwrap().is_empty());

        let mut no_start = medication(Some(6), vec![slot("s1", 8, &[])]);
        no_start.start_date = None;
        assert!(project_medication(&no_start).unwrap().is_empty());

        // More than a day between doses
        assert!(project_medication(&medication(Some(48), vec![slot("s1", 8, &[])]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_instant_slot_without_start_date() {
        let mut med = medication(Some(12), vec![]);
        med.start_date = None;
        med.schedules.push(ScheduleSlot {
            id: "s1".to_string(),
            medication_id: "med".to_string(),
            nominal: NominalTime::Instant(at("2024-02-01 06:00:00")),
            intake_logs: vec![],
        });
        let schedules = project_medication(&med).unwrap();
        assert_eq!(times(&schedules), vec!["06:00:00", "18:00:00"]);
    }

    #[test]
    fn test_non_positive_interval_is_isolated() {
        let bad = medication(Some(0), vec![slot("s1", 8, &[])]);
        let mut good = medication(Some(12), vec![slot("s1", 8, &[])]);
        good.id = "good".to_string();

        assert!(matches!(project_medication(&bad), Err(CadenceError::Data(_))));

        let batch = project_medications(&[bad, good]);
        assert_eq!(batch.projections.len(), 2);
        assert!(batch.projections[0].future_schedules.is_empty());
        assert_eq!(batch.projections[1].future_schedules.len(), 2);
        assert_eq!(batch.issues.len(), 1);
        assert_eq!(batch.issues[0].medication_id, "med");
    }

    #[test]
    fn test_idempotent() {
        let med = medication(
            Some(6),
            vec![slot("s1", 8, &["2024-01-01 08:10:00", "2024-01-02 02:20:00"])],
        );
        let first = project_medications(std::slice::from_ref(&med));
        let second = project_medications(std::slice::from_ref(&med));
        assert_eq!(first.projections, second.projections);
    }
}
