//! Normalization Error Types

use aq_core::{Pollutant, Unit};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons a raw reading is discarded
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidReading {
    /// Feed delivered an explicit null
    #[error("Missing pollutant value")]
    MissingValue,

    /// Concentration below zero
    #[error("Negative pollutant value {0}")]
    NegativeValue(f64),

    /// NaN or infinite concentration
    #[error("Non-finite pollutant value")]
    NonFiniteValue,

    /// Timestamp could not be parsed as RFC 3339
    #[error("Unparseable {field} timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    /// Observation lies too far ahead of the processing clock
    #[error("Observation at {observed_at} is ahead of the allowed limit {limit}")]
    FutureObservation {
        observed_at: DateTime<Utc>,
        limit: DateTime<Utc>,
    },

    /// Observation lies too far after the declared receipt time
    #[error("Observation at {observed_at} is after receipt at {received_at}")]
    ReceivedBeforeObserved {
        observed_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
    },

    /// Pollutant name not recognised
    #[error("Unknown pollutant: {0}")]
    UnknownPollutant(String),

    /// Unit name not recognised
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// Unit cannot express this pollutant (e.g. ppb for particulates)
    #[error("Unit {unit:?} is not convertible for {pollutant}")]
    IncompatibleUnit { pollutant: Pollutant, unit: Unit },

    /// Station id or country code malformed
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

impl InvalidReading {
    /// Short machine-readable reason, used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            InvalidReading::MissingValue => "missing_value",
            InvalidReading::NegativeValue(_) => "negative_value",
            InvalidReading::NonFiniteValue => "non_finite_value",
            InvalidReading::InvalidTimestamp { .. } => "invalid_timestamp",
            InvalidReading::FutureObservation { .. } => "future_observation",
            InvalidReading::ReceivedBeforeObserved { .. } => "received_before_observed",
            InvalidReading::UnknownPollutant(_) => "unknown_pollutant",
            InvalidReading::UnknownUnit(_) => "unknown_unit",
            InvalidReading::IncompatibleUnit { .. } => "incompatible_unit",
            InvalidReading::InvalidIdentity(_) => "invalid_identity",
        }
    }
}
