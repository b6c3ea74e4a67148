//! Reconciler Implementation

use crate::error::ReconcileError;
use crate::pair::{PairSide, StationPair};
use crate::playbook::PolicyPlaybook;
use crate::transport::TransportModel;
use aq_core::{
    AlertLevel, Attribution, CoordinationEvent, CoreError, EventId, EventIdentity, LevelSample,
    PolicyAction, QualityFlag, Side, StationSnapshot,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use staleness::Freshness;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Slack around the wind-implied travel time (seconds)
    pub transport_tolerance_seconds: u64,
    /// Weight of a suspect reading in the contribution estimate
    pub suspect_weight: f64,
    /// Per-country recommended actions
    pub playbook: PolicyPlaybook,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            transport_tolerance_seconds: 7200, // 2 hours
            suspect_weight: 0.5,
            playbook: PolicyPlaybook::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Tolerance around the travel time
    pub fn tolerance(&self) -> Duration {
        // chrono rejects durations beyond i64::MAX milliseconds.
        Duration::seconds(self.transport_tolerance_seconds.min(i64::MAX as u64 / 1000) as i64)
    }

    fn quality_weight(&self, flag: QualityFlag) -> f64 {
        match flag {
            QualityFlag::Verified => 1.0,
            QualityFlag::Suspect => self.suspect_weight.clamp(0.0, 1.0),
        }
    }
}

/// Cross-border reconciler
pub struct Reconciler {
    config: ReconcilerConfig,
    model: Arc<dyn TransportModel>,
}

impl Reconciler {
    /// Create a reconciler around a transport model
    pub fn new(config: ReconcilerConfig, model: Arc<dyn TransportModel>) -> Self {
        info!(
            "Creating reconciler: transport tolerance {}s, suspect weight {}",
            config.transport_tolerance_seconds, config.suspect_weight
        );
        Self { config, model }
    }

    /// Decide whether a pair warrants a coordination event.
    ///
    /// The downwind station's current state is paired with the upwind
    /// station's state one travel time earlier, taken from the upwind
    /// snapshot's history. Deterministic: the same snapshots and model
    /// answer always produce the same event, including its id. Returns
    /// `Ok(None)` when nothing needs coordinating.
    pub fn reconcile(
        &self,
        pair: &StationPair,
        a: &PairSide,
        b: &PairSide,
    ) -> Result<Option<CoordinationEvent>, ReconcileError> {
        let result = self.decide(pair, a, b);
        if let Err(ReconcileError::InsufficientData { .. }) = &result {
            metrics::counter!("aq_insufficient_data_total").increment(1);
        }
        result
    }

    fn decide(
        &self,
        pair: &StationPair,
        a: &PairSide,
        b: &PairSide,
    ) -> Result<Option<CoordinationEvent>, ReconcileError> {
        let current_a = Self::current_sample(pair, Side::A, a)?;
        let current_b = Self::current_sample(pair, Side::B, b)?;

        let at = current_a.observed_at.max(current_b.observed_at);
        let Some(estimate) = self.model.estimate(pair, at) else {
            debug!("Pair {}: no plausible transport at {}", pair.id, at);
            return Ok(None);
        };

        let (upwind_view, downwind_now) = match estimate.upwind {
            Side::A => (a, current_b),
            Side::B => (b, current_a),
        };
        let Some(upwind_then) = self.emission_sample(
            &upwind_view.snapshot,
            downwind_now.observed_at,
            estimate.travel_time,
        ) else {
            if downwind_now.level > AlertLevel::Yellow {
                // Downwind is polluted but the upwind state at departure time is unknown
                return Err(ReconcileError::InsufficientData {
                    station: pair.station(estimate.upwind).clone(),
                    freshness: Freshness::Missing,
                });
            }
            debug!(
                "Pair {}: no upwind sample {} min before {}",
                pair.id,
                estimate.travel_time.num_minutes(),
                downwind_now.observed_at
            );
            return Ok(None);
        };

        let (sample_a, sample_b) = match estimate.upwind {
            Side::A => (upwind_then, downwind_now),
            Side::B => (downwind_now, upwind_then),
        };
        let levels = (sample_a.level, sample_b.level);
        let severity = levels.0.max(levels.1);
        if severity <= AlertLevel::Yellow {
            debug!("Pair {} below coordination threshold ({})", pair.id, severity);
            return Ok(None);
        }

        let window_start = self.window_start(upwind_then.observed_at)?;
        let event_id = EventId::derive(&EventIdentity {
            pair_id: pair.id.clone(),
            window_start: window_start.timestamp(),
            level_a: levels.0,
            level_b: levels.1,
        })?;

        let upwind_country = pair.country(estimate.upwind).clone();
        let attribution = if levels.0 >= AlertLevel::Red && levels.1 >= AlertLevel::Red {
            Attribution::Shared
        } else {
            Attribution::Upwind(upwind_country.clone())
        };

        let mut recommended_actions = BTreeMap::new();
        for side in [Side::A, Side::B] {
            let country = pair.country(side).clone();
            let own_level = match side {
                Side::A => levels.0,
                Side::B => levels.1,
            };
            // Sources act at the event's severity; receivers at their own level.
            let is_source = match &attribution {
                Attribution::Shared => true,
                Attribution::Upwind(source) => source == &country,
            };
            let actions = if is_source {
                self.config.playbook.actions(&country, severity)
            } else {
                let mut actions = self.config.playbook.actions(&country, own_level);
                if !actions.contains(&PolicyAction::PublicAdvisory) {
                    actions.insert(0, PolicyAction::PublicAdvisory);
                }
                actions
            };
            recommended_actions.insert(country, actions);
        }

        // Compare the first pollutant both sides report, PM2.5 when present
        let compared = sample_a
            .values
            .iter()
            .find_map(|(pollutant, value_a)| {
                sample_b.values.get(pollutant).map(|value_b| (value_a, value_b))
            });
        let (value_difference, quality_a, quality_b) = match compared {
            Some((value_a, value_b)) => (
                value_a.value - value_b.value,
                value_a.quality_flag,
                value_b.quality_flag,
            ),
            None => (0.0, sample_a.worst_quality(), sample_b.worst_quality()),
        };
        let transboundary_estimate = estimate.contribution
            * self.config.quality_weight(quality_a)
            * self.config.quality_weight(quality_b);
        let worse_side = match levels.0.cmp(&levels.1) {
            std::cmp::Ordering::Greater => Side::A,
            std::cmp::Ordering::Less => Side::B,
            std::cmp::Ordering::Equal if value_difference >= 0.0 => Side::A,
            std::cmp::Ordering::Equal => Side::B,
        };

        metrics::counter!("aq_coordination_events_total").increment(1);
        Ok(Some(CoordinationEvent {
            event_id,
            pair_id: pair.id.clone(),
            country_pair: (pair.country_a.clone(), pair.country_b.clone()),
            stations: (pair.station_a.clone(), pair.station_b.clone()),
            levels,
            severity,
            attribution,
            transboundary_estimate,
            value_difference,
            worse_side,
            window_start,
            source_sequences: (sample_a.sequence, sample_b.sequence),
            recommended_actions,
            created_at: sample_a.observed_at.max(sample_b.observed_at),
        }))
    }

    /// Upwind sample closest to `arrival - travel`, within the tolerance.
    /// Ties go to the later sample.
    fn emission_sample<'a>(
        &self,
        upwind: &'a StationSnapshot,
        arrival: DateTime<Utc>,
        travel: Duration,
    ) -> Option<&'a LevelSample> {
        let departure = arrival.checked_sub_signed(travel)?;
        let tolerance = self.config.tolerance();
        upwind
            .history
            .iter()
            .map(|sample| ((sample.observed_at - departure).abs(), sample))
            .filter(|(offset, _)| *offset <= tolerance)
            .min_by_key(|(offset, sample)| (*offset, Reverse(sample.sequence)))
            .map(|(_, sample)| sample)
    }

    /// Start of the window bucket containing `instant`
    fn window_start(&self, instant: DateTime<Utc>) -> Result<DateTime<Utc>, ReconcileError> {
        let span = (self.config.tolerance().num_seconds() * 2).max(1);
        let start = instant.timestamp().div_euclid(span) * span;
        DateTime::from_timestamp(start, 0).ok_or_else(|| {
            ReconcileError::Identity(CoreError::Encoding(format!(
                "window start {} out of range",
                start
            )))
        })
    }

    /// Current sample of a side that is reliable right now
    fn current_sample<'a>(
        pair: &StationPair,
        side: Side,
        view: &'a PairSide,
    ) -> Result<&'a LevelSample, ReconcileError> {
        let expected = pair.station(side);
        if &view.snapshot.station_id != expected {
            return Err(ReconcileError::PairMismatch {
                expected: expected.clone(),
                got: view.snapshot.station_id.clone(),
            });
        }
        match view.snapshot.current() {
            Some(sample) if view.freshness.is_reliable() => Ok(sample),
            current => Err(ReconcileError::InsufficientData {
                station: expected.clone(),
                freshness: if current.is_none() {
                    Freshness::Missing
                } else {
                    view.freshness
                },
            }),
        }
    }
}
