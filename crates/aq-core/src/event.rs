//! Coordination events and their deterministic identity

use crate::error::CoreError;
use crate::level::AlertLevel;
use crate::station::{CountryCode, StationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Namespace for name-based event ids
const EVENT_NAMESPACE: Uuid = Uuid::from_u128(0x7a1f_3c52_9e04_5b8d_a6c1_02f4_d83e_6b19);

/// One side of a station pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    /// The other side of the pair
    pub fn opposite(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Which jurisdiction an event is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "country")]
pub enum Attribution {
    /// Emission from the upwind country plausibly reaches the downwind one
    Upwind(CountryCode),
    /// Both sides independently at Red; co-equal sources
    Shared,
}

/// Coordinated policy action recommended to a jurisdiction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    PublicAdvisory,
    StreetWatering,
    ConstructionHalt,
    IndustrialAudit,
    BrickKilnShutdown,
    SchoolClosure,
    OddEvenVehicles,
}

impl PolicyAction {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::PublicAdvisory => "public_advisory",
            PolicyAction::StreetWatering => "street_watering",
            PolicyAction::ConstructionHalt => "construction_halt",
            PolicyAction::IndustrialAudit => "industrial_audit",
            PolicyAction::BrickKilnShutdown => "brick_kiln_shutdown",
            PolicyAction::SchoolClosure => "school_closure",
            PolicyAction::OddEvenVehicles => "odd_even_vehicles",
        }
    }
}

/// Inputs that define an event's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventIdentity {
    pub pair_id: String,
    /// Window start as unix seconds
    pub window_start: i64,
    pub level_a: AlertLevel,
    pub level_b: AlertLevel,
}

/// Deterministic event identifier (UUID v5 over the encoded identity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Derive the id for an identity tuple; equal inputs give equal ids
    pub fn derive(identity: &EventIdentity) -> Result<Self, CoreError> {
        let bytes =
            postcard::to_allocvec(identity).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(Self(Uuid::new_v5(&EVENT_NAMESPACE, &bytes)))
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Cross-border coordination decision. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    pub event_id: EventId,
    pub pair_id: String,
    pub country_pair: (CountryCode, CountryCode),
    pub stations: (StationId, StationId),
    pub levels: (AlertLevel, AlertLevel),
    /// Highest of the two levels
    pub severity: AlertLevel,
    pub attribution: Attribution,
    /// Estimated transboundary contribution fraction (0.0 to 1.0)
    pub transboundary_estimate: f64,
    /// Side A value minus side B value (µg/m³)
    pub value_difference: f64,
    pub worse_side: Side,
    pub window_start: DateTime<Utc>,
    /// Sequence numbers of the contributing states (provenance only)
    pub source_sequences: (u64, u64),
    pub recommended_actions: BTreeMap<CountryCode, Vec<PolicyAction>>,
    pub created_at: DateTime<Utc>,
}

impl CoordinationEvent {
    /// Whether a country is one of the pair's jurisdictions
    pub fn involves(&self, country: &CountryCode) -> bool {
        &self.country_pair.0 == country || &self.country_pair.1 == country
    }
}
