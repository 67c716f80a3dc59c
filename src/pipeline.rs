//! Compliance data pipeline and orchestration
//!
//! This module turns domain medications into per-medication, time-ordered
//! compliance feature series, and provides the public one-shot API that runs
//! the full chain from a JSON payload:
//! payload → validation/adaptation → compliance series → training sequences
//! and projected future schedules.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::baseline::{ComplianceWindow, NEUTRAL_COMPLIANCE};
use crate::compensator::{project_medications, ProjectionBatch};
use crate::config::CadenceConfig;
use crate::error::{CadenceError, RecordIssue};
use crate::features::intake_compliance;
use crate::schema::{AdaptedBatch, PayloadAdapter, TimeParser};
use crate::sequence::SequenceBuilder;
use crate::types::{
    hour_of_day, minutes_between, ComplianceRecord, Medication, MedicationProjection, NominalTime,
    ScheduleSlot, TrainingSequence,
};

/// Time-ordered compliance records of one medication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationSeries {
    pub medication_id: String,
    pub records: Vec<ComplianceRecord>,
}

/// Output of one pipeline run: the feature series plus skipped-record issues
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureDataset {
    pub series: Vec<MedicationSeries>,
    #[serde(default)]
    pub issues: Vec<RecordIssue>,
}

impl FeatureDataset {
    /// Total number of records across medications
    pub fn record_count(&self) -> usize {
        self.series.iter().map(|s| s.records.len()).sum()
    }

    /// Series for a given medication
    pub fn series_for(&self, medication_id: &str) -> Option<&MedicationSeries> {
        self.series.iter().find(|s| s.medication_id == medication_id)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Compliance data pipeline
pub struct CompliancePipeline;

impl CompliancePipeline {
    /// Build the feature series of every medication.
    ///
    /// Medications are processed independently; a malformed record only
    /// removes itself from the output.
    pub fn run(medications: &[Medication]) -> FeatureDataset {
        let mut dataset = FeatureDataset::default();

        for medication in medications {
            let (records, mut issues) = Self::medication_series(medication);
            debug!(
                "medication {}: {} compliance records",
                medication.id,
                records.len()
            );
            dataset.issues.append(&mut issues);
            dataset.series.push(MedicationSeries {
                medication_id: medication.id.clone(),
                records,
            });
        }

        info!(
            "compliance pipeline: {} medications, {} records, {} issues",
            dataset.series.len(),
            dataset.record_count(),
            dataset.issues.len()
        );

        dataset
    }

    /// Build the ordered records of a single medication
    pub fn medication_series(medication: &Medication) -> (Vec<ComplianceRecord>, Vec<RecordIssue>) {
        let mut records = Vec::new();
        let mut issues = Vec::new();

        for slot in &medication.schedules {
            if slot.intake_logs.is_empty() {
                match missed_slot_record(medication, slot) {
                    Ok(record) => records.push(record),
                    Err(e) => issues.push(RecordIssue::new(
                        &medication.id,
                        Some(slot.id.as_str()),
                        e.to_string(),
                    )),
                }
                continue;
            }

            for log in &slot.intake_logs {
                let scheduled = slot.nominal.nearest_to(log.timestamp);
                let deviation = minutes_between(scheduled, log.timestamp);
                records.push(ComplianceRecord {
                    medication_id: medication.id.clone(),
                    schedule_id: slot.id.clone(),
                    scheduled_time: scheduled,
                    actual_time: Some(log.timestamp),
                    taken: log.taken,
                    hour_of_day: hour_of_day(log.timestamp),
                    deviation_minutes: Some(deviation),
                    compliance: intake_compliance(log.taken, Some(deviation)),
                    rolling_compliance: 0.0,
                    previous_compliance: 0.0,
                });
            }
        }

        records.sort_by(|a, b| {
            a.scheduled_time
                .cmp(&b.scheduled_time)
                .then(a.actual_time.cmp(&b.actual_time))
        });

        let mut window = ComplianceWindow::default();
        for record in &mut records {
            record.previous_compliance = window.last().unwrap_or(NEUTRAL_COMPLIANCE);
            window.push(record.compliance);
            record.rolling_compliance = window.factor();
        }

        (records, issues)
    }
}

/// Outer-join row for a slot that has no intake log at all
fn missed_slot_record(
    medication: &Medication,
    slot: &ScheduleSlot,
) -> Result<ComplianceRecord, CadenceError> {
    let scheduled = match (slot.nominal, medication.start_date) {
        (NominalTime::Instant(dt), _) => dt,
        (nominal, Some(date)) => nominal.on_date(date),
        (_, None) => {
            return Err(CadenceError::data(
                "slot has no intake logs and the medication has no start date",
            ))
        }
    };

    Ok(ComplianceRecord {
        medication_id: medication.id.clone(),
        schedule_id: slot.id.clone(),
        scheduled_time: scheduled,
        actual_time: None,
        taken: false,
        hour_of_day: hour_of_day(scheduled),
        deviation_minutes: None,
        compliance: intake_compliance(false, None),
        rolling_compliance: 0.0,
        previous_compliance: 0.0,
    })
}

/// Everything produced from one payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub dataset: FeatureDataset,
    pub sequences: Vec<TrainingSequence>,
    pub projections: Vec<MedicationProjection>,
    /// Adapter and compensator issues; pipeline issues stay in `dataset.issues`
    pub issues: Vec<RecordIssue>,
}

impl ProcessOutput {
    /// Issues from every stage
    pub fn all_issues(&self) -> impl Iterator<Item = &RecordIssue> {
        self.issues.iter().chain(self.dataset.issues.iter())
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len() + self.dataset.issues.len()
    }
}

/// Run the full chain on a JSON payload (stateless, one-shot).
///
/// # Arguments
/// * `payload_json` - Medication batch JSON as received from the device/app
/// * `config` - Pipeline and sequence settings
///
/// # Returns
/// Feature dataset, training sequences, and projected schedules
///
/// # Example
/// ```ignore
/// let output = process_payload(&payload_json, &CadenceConfig::default())?;
/// ```
pub fn process_payload(
    payload_json: &str,
    config: &CadenceConfig,
) -> Result<ProcessOutput, CadenceError> {
    CadenceProcessor::new(config.clone()).process_json(payload_json)
}

/// Processor bound to a configuration and a time parser
pub struct CadenceProcessor {
    config: CadenceConfig,
    adapter: PayloadAdapter,
}

impl Default for CadenceProcessor {
    fn default() -> Self {
        Self::new(CadenceConfig::default())
    }
}

impl CadenceProcessor {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            config,
            adapter: PayloadAdapter::default(),
        }
    }

    /// Use a fixed reference date for bare `HH:MM:SS` timestamps
    pub fn with_time_parser(mut self, parser: TimeParser) -> Self {
        self.adapter = PayloadAdapter::new(parser);
        self
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    /// Validate and adapt a JSON payload
    pub fn adapt_json(&self, payload_json: &str) -> Result<AdaptedBatch, CadenceError> {
        self.adapter.parse_json(payload_json)
    }

    /// Process a JSON payload through every stage
    pub fn process_json(&self, payload_json: &str) -> Result<ProcessOutput, CadenceError> {
        // Stage 1: Validate and convert to domain medications
        let adapted = self.adapt_json(payload_json)?;
        Ok(self.process_medications(&adapted.medications, adapted.issues))
    }

    /// Process already-adapted medications
    pub fn process_medications(
        &self,
        medications: &[Medication],
        mut issues: Vec<RecordIssue>,
    ) -> ProcessOutput {
        // Stage 2: Compliance feature series
        let dataset = CompliancePipeline::run(medications);

        // Stage 3: Sliding training windows
        let builder = SequenceBuilder::new(self.config.pipeline.sequence_length);
        let sequences = builder.build(&dataset);

        // Stage 4: Offset-compensated projections
        let ProjectionBatch {
            projections,
            issues: mut projection_issues,
        } = project_medications(medications);
        issues.append(&mut projection_issues);

        ProcessOutput {
            dataset,
            sequences,
            projections,
            issues,
        }
    }
}
