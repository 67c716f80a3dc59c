//! Wire payload for medication schedules and intake logs
//!
//! Every field is optional at the serde level so that missing fields surface
//! as field-level validation errors instead of opaque JSON errors.

use serde::{Deserialize, Serialize};

/// Top-level request body: a batch of medications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicationBatchPayload {
    #[serde(default)]
    pub medications: Option<Vec<MedicationPayload>>,
}

/// One medication as received from the device/app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicationPayload {
    #[serde(default)]
    pub medication_id: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    /// Dosing interval as `HH:MM:SS`
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub schedules: Option<Vec<SchedulePayload>>,
}

/// One schedule slot of a medication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulePayload {
    #[serde(default)]
    pub schedule_id: Option<String>,
    /// `HH:MM:SS` or a full ISO-8601 timestamp
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub intake_logs: Vec<IntakeLogPayload>,
}

/// One intake button press
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeLogPayload {
    #[serde(default, alias = "timestamp", alias = "button_press_time")]
    pub time: Option<String>,
    #[serde(default, alias = "is_taken", skip_serializing_if = "Option::is_none")]
    pub taken: Option<bool>,
}

impl MedicationBatchPayload {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Boundary validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: medications")]
    MissingMedications,

    #[error("Medication #{index}: missing required field '{field}'")]
    MedicationField { index: usize, field: &'static str },

    #[error("Medication '{medication}', schedule #{index}: missing required field '{field}'")]
    ScheduleField {
        medication: String,
        index: usize,
        field: &'static str,
    },
}

impl MedicationBatchPayload {
    /// Check that every required field is present.
    ///
    /// Presence is what matters here: a blank `interval` or `start_date` passes
    /// and later yields an empty projection rather than a rejection.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let medications = self
            .medications
            .as_ref()
            .ok_or(ValidationError::MissingMedications)?;

        for (index, med) in medications.iter().enumerate() {
            let missing = |field| ValidationError::MedicationField { index, field };
            let medication = med.medication_id.as_ref().ok_or(missing("medication_id"))?;
            med.start_date.as_ref().ok_or(missing("start_date"))?;
            med.interval.as_ref().ok_or(missing("interval"))?;
            let schedules = med.schedules.as_ref().ok_or(missing("schedules"))?;

            for (sched_index, schedule) in schedules.iter().enumerate() {
                let missing = |field| ValidationError::ScheduleField {
                    medication: medication.clone(),
                    index: sched_index,
                    field,
                };
                schedule.schedule_id.as_ref().ok_or_else(|| missing("schedule_id"))?;
                schedule
                    .scheduled_time
                    .as_ref()
                    .ok_or_else(|| missing("scheduled_time"))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_aliases() {
        let json = r#"{
            "medications": [{
                "medication_id": "med_1",
                "start_date": "2024-01-01",
                "interval": "06:00:00",
                "schedules": [{
                    "schedule_id": "s1",
                    "scheduled_time": "08:00:00",
                    "intake_logs": [
                        { "time": "2024-01-01T08:10:00Z", "taken": true },
                        { "button_press_time": "2024-01-01T14:05:00", "is_taken": false }
                    ]
                }]
            }]
        }"#;

        let payload = MedicationBatchPayload::from_json(json).unwrap();
        assert!(payload.validate().is_ok());

        let medications = payload.medications.unwrap();
        let logs = &medications[0].schedules.as_ref().unwrap()[0].intake_logs;
        assert_eq!(logs[1].time.as_deref(), Some("2024-01-01T14:05:00"));
        assert_eq!(logs[1].taken, Some(false));
    }

    #[test]
    fn test_missing_medications() {
        let payload = MedicationBatchPayload::from_json("{}").unwrap();
        assert_eq!(payload.validate(), Err(ValidationError::MissingMedications));
    }

    #[test]
    fn test_missing_medication_field() {
        let json = r#"{"medications": [{"medication_id": "m", "start_date": "2024-01-01", "schedules": []}]}"#;
        let payload = MedicationBatchPayload::from_json(json).unwrap();
        let err = payload.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::MedicationField {
                index: 0,
                field: "interval"
            }
        );
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn test_missing_schedule_field() {
        let json = r#"{"medications": [{
            "medication_id": "m",
            "start_date": "2024-01-01",
            "interval": "08:00:00",
            "schedules": [{"schedule_id": "s1"}]
        }]}"#;
        let payload = MedicationBatchPayload::from_json(json).unwrap();
        assert_eq!(
            payload.validate(),
            Err(ValidationError::ScheduleField {
                medication: "m".to_string(),
                index: 0,
                field: "scheduled_time"
            })
        );
    }

    #[test]
    fn test_blank_interval_passes_validation() {
        let json = r#"{"medications": [{
            "medication_id": "m",
            "start_date": "",
            "interval": "",
            "schedules": []
        }]}"#;
        let payload = MedicationBatchPayload::from_json(json).unwrap();
        assert!(payload.validate().is_ok());
    }
}
