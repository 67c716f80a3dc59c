//! Intake sources
//!
//! An intake source answers "when did the user actually take the dose?" for
//! the environment. Recorded sources replay real device history; simulated
//! sources generate behavior for training without real data. All randomness
//! in the crate is confined to [`SimulatedIntakes`].

use chrono::{NaiveDate, NaiveDateTime};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{duration_from_minutes, minutes_between, ComplianceRecord};

/// Strategy producing realized intake times
pub trait IntakeSource {
    /// Scheduled time of the first dose of a new episode.
    ///
    /// Called on every reset; `seed` lets randomized sources restart
    /// reproducibly.
    fn episode_anchor(&mut self, seed: Option<u64>) -> NaiveDateTime;

    /// Realized intake for a dose scheduled at `scheduled` whose reminder
    /// fires at `reminder`
    fn realized_intake(&mut self, scheduled: NaiveDateTime, reminder: NaiveDateTime)
        -> NaiveDateTime;
}

fn default_anchor() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap_or_default()
}

/// Device-backed source replaying recorded deviations in order.
///
/// Replay wraps around when an episode outlasts the recorded history.
#[derive(Debug, Clone)]
pub struct RecordedIntakes {
    anchor: NaiveDateTime,
    deviations: Vec<f64>,
    cursor: usize,
}

impl RecordedIntakes {
    pub fn new(anchor: NaiveDateTime, deviations: Vec<f64>) -> Self {
        Self {
            anchor,
            deviations,
            cursor: 0,
        }
    }

    /// Replay the logged intakes of one medication's compliance series
    pub fn from_records(records: &[ComplianceRecord]) -> Self {
        let usable: Vec<&ComplianceRecord> = records
            .iter()
            .filter(|r| r.deviation_minutes.is_some())
            .collect();
        let anchor = usable
            .first()
            .map(|r| r.scheduled_time)
            .unwrap_or_else(default_anchor);
        let deviations = usable.iter().filter_map(|r| r.deviation_minutes).collect();
        Self::new(anchor, deviations)
    }

    pub fn len(&self) -> usize {
        self.deviations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deviations.is_empty()
    }
}

impl IntakeSource for RecordedIntakes {
    fn episode_anchor(&mut self, _seed: Option<u64>) -> NaiveDateTime {
        self.cursor = 0;
        self.anchor
    }

    fn realized_intake(
        &mut self,
        scheduled: NaiveDateTime,
        _reminder: NaiveDateTime,
    ) -> NaiveDateTime {
        if self.deviations.is_empty() {
            return scheduled;
        }
        let deviation = self.deviations[self.cursor % self.deviations.len()];
        self.cursor += 1;
        scheduled + duration_from_minutes(deviation)
    }
}

/// Deterministic source: the user always takes the dose at a fixed offset
#[derive(Debug, Clone, Copy)]
pub struct FixedOffsetIntakes {
    pub anchor: NaiveDateTime,
    pub offset_minutes: f64,
}

impl FixedOffsetIntakes {
    pub fn new(anchor: NaiveDateTime, offset_minutes: f64) -> Self {
        Self {
            anchor,
            offset_minutes,
        }
    }
}

impl IntakeSource for FixedOffsetIntakes {
    fn episode_anchor(&mut self, _seed: Option<u64>) -> NaiveDateTime {
        self.anchor
    }

    fn realized_intake(
        &mut self,
        scheduled: NaiveDateTime,
        _reminder: NaiveDateTime,
    ) -> NaiveDateTime {
        scheduled + duration_from_minutes(self.offset_minutes)
    }
}

/// Behavior model for [`SimulatedIntakes`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedIntakeConfig {
    /// Where the user tends to take the dose relative to schedule, minutes
    pub habitual_offset_minutes: f64,
    /// Uniform noise half-width, minutes
    pub jitter_minutes: f64,
    /// How strongly the intake follows the reminder (0 = ignores it, 1 = exact)
    pub responsiveness: f64,
    /// Probability that a dose is forgotten and taken very late
    pub skip_probability: f64,
    /// Extra delay of a forgotten dose, minutes
    pub skip_delay_minutes: f64,
    /// Scheduled time of the first dose
    pub anchor: NaiveDateTime,
}

impl Default for SimulatedIntakeConfig {
    fn default() -> Self {
        Self {
            habitual_offset_minutes: 25.0,
            jitter_minutes: 20.0,
            responsiveness: 0.3,
            skip_probability: 0.1,
            skip_delay_minutes: 180.0,
            anchor: default_anchor(),
        }
    }
}

/// Seeded random intake simulator for training without real data
pub struct SimulatedIntakes {
    config: SimulatedIntakeConfig,
    rng: ChaCha8Rng,
}

impl SimulatedIntakes {
    pub fn new(config: SimulatedIntakeConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Reseed the RNG
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &SimulatedIntakeConfig {
        &self.config
    }

    fn sample_jitter(&mut self) -> f64 {
        let width = self.config.jitter_minutes.abs();
        if width == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-width..=width)
    }

    fn sample_skip(&mut self) -> bool {
        self.rng.gen::<f64>() < self.config.skip_probability
    }
}

impl IntakeSource for SimulatedIntakes {
    fn episode_anchor(&mut self, seed: Option<u64>) -> NaiveDateTime {
        if let Some(seed) = seed {
            self.reseed(seed);
        }
        self.config.anchor
    }

    fn realized_intake(
        &mut self,
        scheduled: NaiveDateTime,
        reminder: NaiveDateTime,
    ) -> NaiveDateTime {
        let r = self.config.responsiveness.clamp(0.0, 1.0);
        let reminder_shift = minutes_between(scheduled, reminder);
        let mut shift = (1.0 - r) * self.config.habitual_offset_minutes + r * reminder_shift;
        shift += self.sample_jitter();
        if self.sample_skip() {
            shift += self.config.skip_delay_minutes;
        }
        scheduled + duration_from_minutes(shift)
    }
}
