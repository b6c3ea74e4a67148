//! Transport models
//!
//! The contribution fraction is an external model input; nothing here
//! tries to compute it from concentrations.

use crate::pair::StationPair;
use aq_core::Side;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Wind speeds below this carry nothing across the border (m/s)
const CALM_WIND_MS: f64 = 0.5;

/// Model answer for one pair at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportEstimate {
    /// Side whose emissions travel towards the other
    pub upwind: Side,
    /// Expected travel time from upwind to downwind station
    pub travel_time: Duration,
    /// Estimated transboundary share of the downwind reading (0.0 to 1.0)
    pub contribution: f64,
}

/// Wind/transport model collaborator
pub trait TransportModel: Send + Sync {
    /// Estimate transport for a pair; `None` means no plausible transport
    fn estimate(&self, pair: &StationPair, at: DateTime<Utc>) -> Option<TransportEstimate>;
}

/// Model driven by a single wind observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindTransportModel {
    /// Direction the wind blows from (meteorological degrees)
    pub wind_from_deg: f64,
    /// Wind speed (m/s)
    pub wind_speed_ms: f64,
    /// Externally supplied transboundary fraction
    pub contribution: f64,
}

impl WindTransportModel {
    fn angular_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }
}

impl TransportModel for WindTransportModel {
    fn estimate(&self, pair: &StationPair, _at: DateTime<Utc>) -> Option<TransportEstimate> {
        if !self.wind_speed_ms.is_finite() || self.wind_speed_ms < CALM_WIND_MS {
            return None;
        }

        let blowing_towards = (self.wind_from_deg + 180.0).rem_euclid(360.0);
        let offset = Self::angular_distance(blowing_towards, pair.bearing_a_to_b_deg);
        let upwind = if offset < 90.0 {
            Side::A
        } else if offset > 90.0 {
            Side::B
        } else {
            // Pure crosswind
            return None;
        };

        let seconds = pair.distance_km * 1000.0 / self.wind_speed_ms;
        if !seconds.is_finite() {
            return None;
        }
        // The cast saturates; chrono then rejects anything out of its range
        let travel_time = Duration::try_seconds(seconds.round() as i64)?;
        Some(TransportEstimate {
            upwind,
            travel_time,
            contribution: self.contribution.clamp(0.0, 1.0),
        })
    }
}

/// Model with a fixed answer, for replays and tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedTransportModel {
    pub upwind: Side,
    pub travel_time_seconds: i64,
    pub contribution: f64,
}

impl TransportModel for FixedTransportModel {
    fn estimate(&self, _pair: &StationPair, _at: DateTime<Utc>) -> Option<TransportEstimate> {
        Some(TransportEstimate {
            upwind: self.upwind,
            travel_time: Duration::try_seconds(self.travel_time_seconds)?,
            contribution: self.contribution.clamp(0.0, 1.0),
        })
    }
}
