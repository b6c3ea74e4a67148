//! Coordinator Error Types

use alerting::ThresholdError;
use aq_core::{CoreError, CountryCode, StationId};
use lanes::LaneError;
use thiserror::Error;

/// Startup configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid alert thresholds: {0}")]
    Thresholds(#[from] ThresholdError),

    #[error("Invalid station pair '{id}': {reason}")]
    InvalidPair { id: String, reason: String },

    #[error("Station {station} configured in both {first} and {second}")]
    ConflictingCountry {
        station: StationId,
        first: CountryCode,
        second: CountryCode,
    },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// A reading that could not be handed to a lane
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("Unroutable reading: {0}")]
    InvalidStation(#[from] CoreError),

    #[error(transparent)]
    Lane(#[from] LaneError),
}

impl IngestError {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::InvalidStation(_) => "invalid_identity",
            IngestError::Lane(LaneError::UnknownStation(_)) => "unknown_station",
            IngestError::Lane(_) => "shutting_down",
        }
    }
}
