//! Per-station hysteresis state machine

use crate::error::AlertError;
use crate::thresholds::{LevelThresholds, ThresholdTable};
use aq_core::{
    AlertLevel, CountryCode, LevelSample, PollutantState, PollutantValue, Reading, StationId,
    StationSnapshot,
};
use chrono::{DateTime, Duration, Utc};
use reading_normalizer::InvalidReading;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hard cap on samples kept per station, whatever the history window
pub const MAX_HISTORY_SAMPLES: usize = 4096;

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Time a value must stay below the exit bar before a downgrade (seconds)
    pub dwell_seconds: u64,
    /// How far back level samples are kept for transport pairing (seconds)
    pub history_seconds: u64,
    /// Entry/exit bars per pollutant
    pub thresholds: ThresholdTable,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dwell_seconds: 900,      // 15 minutes
            history_seconds: 129600, // 36 hours
            thresholds: ThresholdTable::default(),
        }
    }
}

impl AlertConfig {
    /// Minimum dwell below the exit bar
    pub fn dwell(&self) -> Duration {
        clamped_seconds(self.dwell_seconds)
    }

    /// Age limit of kept level samples
    pub fn history_window(&self) -> Duration {
        clamped_seconds(self.history_seconds)
    }
}

// chrono rejects durations beyond i64::MAX milliseconds.
fn clamped_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(i64::MAX as u64 / 1000) as i64)
}

/// Outcome of applying one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Station level raised on this reading
    Upgraded { from: AlertLevel, to: AlertLevel },
    /// Station level lowered after the dwell elapsed
    Downgraded { from: AlertLevel, to: AlertLevel },
    /// Reading accepted, station level kept
    Unchanged(AlertLevel),
    /// Reading not newer than the last accepted one of its pollutant;
    /// nothing changed
    Duplicate,
}

impl Transition {
    /// Whether the level moved
    pub fn is_change(&self) -> bool {
        matches!(self, Transition::Upgraded { .. } | Transition::Downgraded { .. })
    }
}

/// Alert state machine for one station.
///
/// Each pollutant runs its own hysteresis; the station sits at the highest
/// pollutant level. Owned by exactly one lane; all mutation goes through
/// `&mut self`.
#[derive(Debug, Clone)]
pub struct StationTracker {
    config: Arc<AlertConfig>,
    state: StationSnapshot,
}

impl StationTracker {
    /// Create a tracker starting at Green
    pub fn new(station_id: StationId, country_code: CountryCode, config: Arc<AlertConfig>) -> Self {
        Self {
            config,
            state: StationSnapshot::initial(station_id, country_code),
        }
    }

    /// Current level
    pub fn level(&self) -> AlertLevel {
        self.state.level
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> StationSnapshot {
        self.state.clone()
    }

    /// Apply a normalization result. Invalid input fails closed: the level
    /// is retained and the failure surfaced as a data-quality error.
    pub fn apply_result(
        &mut self,
        result: Result<Reading, InvalidReading>,
    ) -> Result<Transition, AlertError> {
        match result {
            Ok(reading) => self.apply(reading),
            Err(err) => {
                warn!(
                    "Data quality failure at {} (level {} retained): {}",
                    self.state.station_id, self.state.level, err
                );
                Err(AlertError::DataQuality(err))
            }
        }
    }

    /// Apply a canonical reading
    pub fn apply(&mut self, reading: Reading) -> Result<Transition, AlertError> {
        if reading.station_id != self.state.station_id {
            return Err(AlertError::WrongStation {
                expected: self.state.station_id.clone(),
                got: reading.station_id,
            });
        }

        let pollutant = reading.pollutant;
        let observed_at = reading.observed_at;
        let value = reading.pollutant_value;
        if let Some(state) = self.state.pollutants.get(&pollutant) {
            if observed_at <= state.observed_at {
                debug!(
                    "Replay at {} ignored: {} observed {} not after {}",
                    self.state.station_id, pollutant, observed_at, state.observed_at
                );
                return Ok(Transition::Duplicate);
            }
        }

        let state = self
            .state
            .pollutants
            .entry(pollutant)
            .or_insert(PollutantState {
                value,
                quality_flag: reading.quality_flag,
                observed_at,
                level: AlertLevel::Green,
                level_entered_at: observed_at,
                below_exit_since: None,
            });
        state.value = value;
        state.quality_flag = reading.quality_flag;
        state.observed_at = observed_at;

        if let Some(thresholds) = self.config.thresholds.get(pollutant) {
            let before = state.level;
            step(state, thresholds, self.config.dwell());
            if state.level != before {
                debug!(
                    "Station {} {} level {} -> {} at {:.1} ug/m3",
                    self.state.station_id, pollutant, before, state.level, value
                );
            }
        }

        let previous = self.state.level;
        self.state.level = self
            .state
            .pollutants
            .values()
            .map(|state| state.level)
            .max()
            .unwrap_or(AlertLevel::Green);
        self.state.sequence += 1;
        self.state.latest = Some(reading);
        self.record_sample(observed_at);

        let current = self.state.level;
        if current > previous {
            info!(
                "Station {} raised {} -> {} on {} at {:.1} ug/m3",
                self.state.station_id, previous, current, pollutant, value
            );
            metrics::counter!("aq_level_transitions_total", "direction" => "up").increment(1);
            Ok(Transition::Upgraded {
                from: previous,
                to: current,
            })
        } else if current < previous {
            info!(
                "Station {} lowered {} -> {} after dwell below exit",
                self.state.station_id, previous, current
            );
            metrics::counter!("aq_level_transitions_total", "direction" => "down").increment(1);
            Ok(Transition::Downgraded {
                from: previous,
                to: current,
            })
        } else {
            Ok(Transition::Unchanged(current))
        }
    }

    /// Append the post-reading state and drop samples past the window
    fn record_sample(&mut self, observed_at: DateTime<Utc>) {
        let history = &mut self.state.history;
        let observed_at = history
            .last()
            .map_or(observed_at, |last| last.observed_at.max(observed_at));
        history.push(LevelSample {
            observed_at,
            sequence: self.state.sequence,
            level: self.state.level,
            values: self
                .state
                .pollutants
                .iter()
                .map(|(pollutant, state)| {
                    (
                        *pollutant,
                        PollutantValue {
                            value: state.value,
                            quality_flag: state.quality_flag,
                        },
                    )
                })
                .collect(),
        });

        let expired = observed_at
            .checked_sub_signed(self.config.history_window())
            .map_or(0, |cutoff| {
                history
                    .iter()
                    .take_while(|sample| sample.observed_at < cutoff)
                    .count()
            });
        let excess = history.len().saturating_sub(MAX_HISTORY_SAMPLES);
        history.drain(..expired.max(excess));
    }
}

/// Advance one pollutant's hysteresis with its latest value
fn step(state: &mut PollutantState, thresholds: &LevelThresholds, dwell: Duration) {
    let current = state.level;
    let entry = thresholds.entry_level(state.value);
    if entry > current {
        state.level = entry;
        state.level_entered_at = state.observed_at;
        state.below_exit_since = None;
        return;
    }

    let Some(band) = thresholds.band(current) else {
        return;
    };
    if state.value >= band.exit {
        state.below_exit_since = None;
        return;
    }

    let since = *state.below_exit_since.get_or_insert(state.observed_at);
    if state.observed_at - since < dwell {
        return;
    }

    // Exit bars rise with level, so this is always below `current`.
    state.level = thresholds.retained_level(state.value);
    state.level_entered_at = state.observed_at;
    state.below_exit_since = None;
}
