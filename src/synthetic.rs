//! Synthetic sample payloads
//!
//! Deterministic demo data: a handful of medications with one to three doses a
//! day, where the earliest schedule instances carry intake logs drifting
//! around the scheduled time and every tenth logged dose is skipped.

use chrono::{Duration, NaiveDateTime};
use log::info;

use crate::schema::{IntakeLogPayload, MedicationBatchPayload, MedicationPayload, SchedulePayload};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Shape of the generated sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGenerator {
    /// First day of every schedule
    pub reference: NaiveDateTime,
    pub medications: usize,
    pub days: u32,
    /// Share of schedule instances (in generation order) that get a log
    pub logged_fraction: f64,
}

impl SampleGenerator {
    pub fn new(reference: NaiveDateTime) -> Self {
        Self {
            reference,
            medications: 5,
            days: 14,
            logged_fraction: 0.7,
        }
    }

    /// Build the sample payload.
    ///
    /// Medication `m` takes `(m mod 3) + 1` doses a day, starting at 08:00
    /// relative to the reference and spaced `12 / doses` hours apart. Instance
    /// `idx` (counted across all medications) is logged when it falls in the
    /// logged fraction, offset by `((idx mod 7) - 3) * 20` minutes, and marked
    /// not taken when `idx mod 10 == 0`.
    pub fn generate(&self) -> MedicationBatchPayload {
        let per_medication: Vec<u32> = (0..self.medications).map(|m| (m % 3) as u32 + 1).collect();
        let total: u32 = per_medication.iter().map(|n| n * self.days).sum();
        let logged_limit = total as f64 * self.logged_fraction;

        let mut idx: u32 = 0;
        let mut medications = Vec::with_capacity(self.medications);

        for (m, &times_per_day) in per_medication.iter().enumerate() {
            let mut schedules = Vec::new();

            for day in 0..self.days {
                for time_idx in 0..times_per_day {
                    let hour = 8 + time_idx * (12 / times_per_day);
                    let scheduled = self.reference
                        + Duration::days(day as i64)
                        + Duration::hours(hour as i64);

                    let intake_logs = if (idx as f64) < logged_limit {
                        let offset = ((idx % 7) as i64 - 3) * 20;
                        vec![IntakeLogPayload {
                            time: Some(
                                (scheduled + Duration::minutes(offset))
                                    .format(TIMESTAMP_FORMAT)
                                    .to_string(),
                            ),
                            taken: Some(idx % 10 != 0),
                        }]
                    } else {
                        Vec::new()
                    };

                    schedules.push(SchedulePayload {
                        schedule_id: Some(format!("sched_{}", idx)),
                        scheduled_time: Some(scheduled.format(TIMESTAMP_FORMAT).to_string()),
                        intake_logs,
                    });
                    idx += 1;
                }
            }

            medications.push(MedicationPayload {
                medication_id: Some(format!("med_{}", m)),
                start_date: Some(self.reference.date().format("%Y-%m-%d").to_string()),
                interval: Some(format!("{:02}:00:00", 24 / times_per_day)),
                schedules: Some(schedules),
            });
        }

        info!(
            "generated {} medications with {} schedule instances",
            medications.len(),
            idx
        );

        MedicationBatchPayload {
            medications: Some(medications),
        }
    }
}
