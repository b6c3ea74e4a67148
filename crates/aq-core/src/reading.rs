//! Raw and canonical readings

use crate::error::CoreError;
use crate::station::{CountryCode, StationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Measured pollutant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    No2,
    So2,
    Co,
    O3,
}

impl Pollutant {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
            Pollutant::O3 => "o3",
        }
    }

    /// Molecular weight in g/mol, `None` for particulate matter
    pub fn molecular_weight(&self) -> Option<f64> {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => None,
            Pollutant::No2 => Some(46.01),
            Pollutant::So2 => Some(64.07),
            Pollutant::Co => Some(28.01),
            Pollutant::O3 => Some(48.00),
        }
    }
}

impl FromStr for Pollutant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "no2" => Ok(Pollutant::No2),
            "so2" => Ok(Pollutant::So2),
            "co" => Ok(Pollutant::Co),
            "o3" => Ok(Pollutant::O3),
            _ => Err(CoreError::UnknownPollutant(s.to_string())),
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a raw measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// µg/m³ (canonical)
    MicrogramsPerCubicMeter,
    /// mg/m³
    MilligramsPerCubicMeter,
    /// ppb by volume
    PartsPerBillion,
    /// ppm by volume
    PartsPerMillion,
}

impl Unit {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::MicrogramsPerCubicMeter => "ug/m3",
            Unit::MilligramsPerCubicMeter => "mg/m3",
            Unit::PartsPerBillion => "ppb",
            Unit::PartsPerMillion => "ppm",
        }
    }
}

impl FromStr for Unit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ug/m3" | "µg/m³" | "µg/m3" | "μg/m³" | "μg/m3" | "ug/m³" => {
                Ok(Unit::MicrogramsPerCubicMeter)
            }
            "mg/m3" | "mg/m³" => Ok(Unit::MilligramsPerCubicMeter),
            "ppb" => Ok(Unit::PartsPerBillion),
            "ppm" => Ok(Unit::PartsPerMillion),
            _ => Err(CoreError::UnknownUnit(s.to_string())),
        }
    }
}

/// Data quality flag assigned during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    /// Within physically plausible bounds
    Verified,
    /// Outside plausible bounds; still alerts, down-weighted in attribution
    Suspect,
}

/// Measurement record as delivered by a national feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub station_id: String,
    pub country_code: String,
    pub pollutant: String,
    /// Explicit `null` marks a missing measurement
    pub value: Option<f64>,
    pub unit: String,
    /// RFC 3339 timestamp of the observation
    pub observed_at: String,
    /// RFC 3339 timestamp of receipt; defaults to processing time
    #[serde(default)]
    pub received_at: Option<String>,
}

/// Canonical reading in µg/m³ with UTC instants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: StationId,
    pub country_code: CountryCode,
    pub pollutant: Pollutant,
    /// Concentration in µg/m³, never negative
    pub pollutant_value: f64,
    pub observed_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub quality_flag: QualityFlag,
}

impl Reading {
    /// Canonical unit label
    pub const UNIT: &'static str = "ug/m3";
}
