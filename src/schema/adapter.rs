//! Adapter for converting validated payloads into domain medications
//!
//! Validation has already guaranteed that required fields are present. This
//! stage parses values; anything malformed is skipped at the smallest
//! possible granularity and reported as a [`RecordIssue`].

use log::warn;

use crate::error::RecordIssue;
use crate::schema::payload::{MedicationBatchPayload, MedicationPayload, SchedulePayload};
use crate::schema::time::{parse_date, parse_interval, TimeParser};
use crate::types::{IntakeLog, Medication, ScheduleSlot};

/// Domain medications plus the per-record problems found while parsing
#[derive(Debug, Clone, Default)]
pub struct AdaptedBatch {
    pub medications: Vec<Medication>,
    pub issues: Vec<RecordIssue>,
}

/// Adapter from wire payloads to domain types
pub struct PayloadAdapter {
    parser: TimeParser,
}

impl Default for PayloadAdapter {
    fn default() -> Self {
        Self::new(TimeParser::today())
    }
}

impl PayloadAdapter {
    pub fn new(parser: TimeParser) -> Self {
        Self { parser }
    }

    /// Parse a JSON request body, validate it, and convert it
    pub fn parse_json(&self, json: &str) -> Result<AdaptedBatch, crate::error::CadenceError> {
        let payload = MedicationBatchPayload::from_json(json)?;
        self.adapt(&payload)
    }

    /// Validate then convert a payload
    pub fn adapt(
        &self,
        payload: &MedicationBatchPayload,
    ) -> Result<AdaptedBatch, crate::error::CadenceError> {
        payload.validate()?;

        let mut batch = AdaptedBatch::default();
        for med in payload.medications.iter().flatten() {
            let medication = self.convert_medication(med, &mut batch.issues);
            batch.medications.push(medication);
        }

        for issue in &batch.issues {
            warn!(
                "skipped record for medication {} (schedule {:?}): {}",
                issue.medication_id, issue.schedule_id, issue.reason
            );
        }

        Ok(batch)
    }

    fn convert_medication(
        &self,
        med: &MedicationPayload,
        issues: &mut Vec<RecordIssue>,
    ) -> Medication {
        let id = med.medication_id.clone().unwrap_or_default();

        let start_date = non_blank(med.start_date.as_deref()).and_then(|raw| {
            parse_date(raw)
                .map_err(|e| issues.push(RecordIssue::new(&id, None, e.to_string())))
                .ok()
        });

        let interval = non_blank(med.interval.as_deref()).and_then(|raw| {
            parse_interval(raw)
                .map_err(|e| issues.push(RecordIssue::new(&id, None, e.to_string())))
                .ok()
        });

        let schedules = med
            .schedules
            .iter()
            .flatten()
            .filter_map(|schedule| self.convert_schedule(&id, schedule, issues))
            .collect();

        Medication {
            id,
            start_date,
            interval,
            schedules,
        }
    }

    fn convert_schedule(
        &self,
        medication_id: &str,
        schedule: &SchedulePayload,
        issues: &mut Vec<RecordIssue>,
    ) -> Option<ScheduleSlot> {
        let schedule_id = schedule.schedule_id.clone().unwrap_or_default();
        let raw_time = schedule.scheduled_time.as_deref().unwrap_or_default();

        let nominal = match self.parser.parse_nominal(raw_time) {
            Ok(nominal) => nominal,
            Err(e) => {
                issues.push(RecordIssue::new(
                    medication_id,
                    Some(schedule_id.as_str()),
                    e.to_string(),
                ));
                return None;
            }
        };

        let mut intake_logs = Vec::with_capacity(schedule.intake_logs.len());
        for (index, log) in schedule.intake_logs.iter().enumerate() {
            let Some(raw) = non_blank(log.time.as_deref()) else {
                issues.push(RecordIssue::new(
                    medication_id,
                    Some(schedule_id.as_str()),
                    format!("intake log #{} has no timestamp", index),
                ));
                continue;
            };

            match self.parser.parse_timestamp(raw) {
                Ok(timestamp) => intake_logs.push(IntakeLog {
                    schedule_id: schedule_id.clone(),
                    timestamp,
                    taken: log.taken.unwrap_or(true),
                }),
                Err(e) => issues.push(RecordIssue::new(
                    medication_id,
                    Some(schedule_id.as_str()),
                    format!("intake log #{}: {}", index, e),
                )),
            }
        }

        Some(ScheduleSlot {
            id: schedule_id,
            medication_id: medication_id.to_string(),
            nominal,
            intake_logs,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
