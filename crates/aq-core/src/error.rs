//! Core Error Types

use thiserror::Error;

/// Errors raised while parsing or deriving core values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Station identifier is empty or contains whitespace
    #[error("Invalid station id: {0:?}")]
    InvalidStationId(String),

    /// Country code is not two uppercase ASCII letters
    #[error("Invalid country code: {0:?}")]
    InvalidCountryCode(String),

    /// Pollutant name not recognised
    #[error("Unknown pollutant: {0}")]
    UnknownPollutant(String),

    /// Unit name not recognised
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// Identity tuple could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}
