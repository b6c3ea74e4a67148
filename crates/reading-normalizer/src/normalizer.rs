//! Raw-to-canonical reading normalizer

use crate::bounds::PlausibilityBounds;
use crate::error::InvalidReading;
use crate::units::to_micrograms_per_cubic_meter;
use aq_core::{CountryCode, Pollutant, QualityFlag, RawReading, Reading, StationId, Unit};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// How far ahead of the processing clock an observation may be (seconds)
    pub max_clock_skew_seconds: u64,
    /// Plausibility bounds used for quality flagging
    pub bounds: PlausibilityBounds,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_seconds: 300, // 5 minutes
            bounds: PlausibilityBounds::default(),
        }
    }
}

/// Stateless reading normalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Create a normalizer with given config
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Configured clock-skew tolerance
    pub fn max_clock_skew(&self) -> Duration {
        Duration::seconds(self.config.max_clock_skew_seconds as i64)
    }

    /// Normalize a raw record against the processing time `now`.
    ///
    /// Pure: the same record and `now` always give the same result.
    pub fn normalize(&self, raw: &RawReading, now: DateTime<Utc>) -> Result<Reading, InvalidReading> {
        let station_id = StationId::new(raw.station_id.clone())
            .map_err(|e| InvalidReading::InvalidIdentity(e.to_string()))?;
        let country_code = CountryCode::new(&raw.country_code)
            .map_err(|e| InvalidReading::InvalidIdentity(e.to_string()))?;
        let pollutant: Pollutant = raw
            .pollutant
            .parse()
            .map_err(|_| InvalidReading::UnknownPollutant(raw.pollutant.clone()))?;
        let unit: Unit = raw
            .unit
            .parse()
            .map_err(|_| InvalidReading::UnknownUnit(raw.unit.clone()))?;

        let value = raw.value.ok_or(InvalidReading::MissingValue)?;
        if !value.is_finite() {
            return Err(InvalidReading::NonFiniteValue);
        }
        if value < 0.0 {
            return Err(InvalidReading::NegativeValue(value));
        }
        let pollutant_value = to_micrograms_per_cubic_meter(pollutant, value, unit)
            .ok_or(InvalidReading::IncompatibleUnit { pollutant, unit })?;

        let skew = self.max_clock_skew();
        let observed_at = parse_instant("observed_at", &raw.observed_at)?;
        let limit = now + skew;
        if observed_at > limit {
            return Err(InvalidReading::FutureObservation { observed_at, limit });
        }

        let received_at = match &raw.received_at {
            Some(text) => {
                let received_at = parse_instant("received_at", text)?;
                if observed_at > received_at + skew {
                    return Err(InvalidReading::ReceivedBeforeObserved {
                        observed_at,
                        received_at,
                    });
                }
                received_at
            }
            None => now,
        };
        // Inside the skew tolerance an observation may postdate receipt.
        let received_at = received_at.max(observed_at);

        let quality_flag = if self.config.bounds.is_plausible(pollutant, pollutant_value) {
            QualityFlag::Verified
        } else {
            debug!(
                "Reading from {} flagged suspect: {} {:.1} ug/m3 outside plausible range",
                station_id, pollutant, pollutant_value
            );
            QualityFlag::Suspect
        };

        Ok(Reading {
            station_id,
            country_code,
            pollutant,
            pollutant_value,
            observed_at,
            received_at,
            quality_flag,
        })
    }
}

fn parse_instant(field: &'static str, text: &str) -> Result<DateTime<Utc>, InvalidReading> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| InvalidReading::InvalidTimestamp {
            field,
            value: text.to_string(),
        })
}
