//! Station pairs and per-side views

use aq_core::{CountryCode, Side, StationId, StationSnapshot};
use serde::{Deserialize, Serialize};
use staleness::Freshness;

/// Two stations on either side of a border
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationPair {
    /// Stable pair name, part of every event id
    pub id: String,
    pub station_a: StationId,
    pub country_a: CountryCode,
    pub station_b: StationId,
    pub country_b: CountryCode,
    /// Compass bearing from station A to station B (degrees)
    pub bearing_a_to_b_deg: f64,
    /// Distance between the stations (km)
    pub distance_km: f64,
}

impl StationPair {
    /// Station on a side
    pub fn station(&self, side: Side) -> &StationId {
        match side {
            Side::A => &self.station_a,
            Side::B => &self.station_b,
        }
    }

    /// Country on a side
    pub fn country(&self, side: Side) -> &CountryCode {
        match side {
            Side::A => &self.country_a,
            Side::B => &self.country_b,
        }
    }

    /// Whether a station belongs to this pair
    pub fn contains(&self, station: &StationId) -> bool {
        &self.station_a == station || &self.station_b == station
    }
}

/// What the reconciler knows about one side at decision time
#[derive(Debug, Clone, PartialEq)]
pub struct PairSide {
    pub snapshot: StationSnapshot,
    pub freshness: Freshness,
}

impl PairSide {
    /// Bundle a snapshot with its freshness
    pub fn new(snapshot: StationSnapshot, freshness: Freshness) -> Self {
        Self {
            snapshot,
            freshness,
        }
    }
}
