//! Alerting Error Types

use aq_core::{AlertLevel, StationId};
use reading_normalizer::InvalidReading;
use thiserror::Error;

/// Errors raised while applying input to a station tracker
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlertError {
    /// Input failed normalization; level retained
    #[error("Data quality failure: {0}")]
    DataQuality(#[from] InvalidReading),

    /// Reading routed to the wrong station's tracker
    #[error("Reading for {got} applied to tracker of {expected}")]
    WrongStation { expected: StationId, got: StationId },
}

/// Invalid threshold configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    /// Exit bar not strictly below the entry bar
    #[error("{level}: exit {exit} must be below enter {enter}")]
    ExitNotBelowEnter {
        level: AlertLevel,
        enter: f64,
        exit: f64,
    },

    /// Bars not strictly increasing with severity
    #[error("{field} thresholds must increase with level ({lower} -> {upper})")]
    NotIncreasing {
        field: &'static str,
        lower: AlertLevel,
        upper: AlertLevel,
    },

    /// Negative or non-finite bar
    #[error("{level}: thresholds must be finite and non-negative")]
    OutOfRange { level: AlertLevel },
}
