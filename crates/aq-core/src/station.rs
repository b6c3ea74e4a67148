//! Station identity and state snapshots

use crate::error::CoreError;
use crate::level::AlertLevel;
use crate::reading::{Pollutant, QualityFlag, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Monitoring station identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StationId(String);

impl StationId {
    /// Create a station id, rejecting empty or whitespace-bearing names
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidStationId(id));
        }
        Ok(Self(id))
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StationId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StationId> for String {
    fn from(id: StationId) -> Self {
        id.0
    }
}

impl FromStr for StationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 3166-1 alpha-2 country code
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Create a country code; input is upper-cased before validation
    pub fn new(code: impl AsRef<str>) -> Result<Self, CoreError> {
        let code = code.as_ref().trim().to_ascii_uppercase();
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(CoreError::InvalidCountryCode(code));
        }
        Ok(Self(code))
    }

    /// Borrow the code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl FromStr for CountryCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hysteresis state of one pollutant at a station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantState {
    /// Latest accepted value (µg/m³)
    pub value: f64,
    pub quality_flag: QualityFlag,
    /// Observation time of the latest accepted value
    pub observed_at: DateTime<Utc>,
    /// Level this pollutant alone would put the station at
    pub level: AlertLevel,
    pub level_entered_at: DateTime<Utc>,
    /// Start of a pending downgrade, if the value sits below the exit bar
    pub below_exit_since: Option<DateTime<Utc>>,
}

/// Value of one pollutant as recorded in a [`LevelSample`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantValue {
    pub value: f64,
    pub quality_flag: QualityFlag,
}

/// Station level and values right after one accepted reading.
///
/// `observed_at` never moves backwards within a history, even when a late
/// reading of another pollutant produced the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSample {
    pub observed_at: DateTime<Utc>,
    pub sequence: u64,
    pub level: AlertLevel,
    pub values: BTreeMap<Pollutant, PollutantValue>,
}

impl LevelSample {
    /// Lowest quality among the recorded values
    pub fn worst_quality(&self) -> QualityFlag {
        if self
            .values
            .values()
            .any(|v| v.quality_flag == QualityFlag::Suspect)
        {
            QualityFlag::Suspect
        } else {
            QualityFlag::Verified
        }
    }
}

/// Copy of a station's state taken at a single instant.
///
/// Produced by the station's owning lane after every mutation; readers
/// only ever see whole snapshots, never a state mid-update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station_id: StationId,
    pub country_code: CountryCode,
    /// Most recent accepted reading
    pub latest: Option<Reading>,
    /// Highest level across pollutants
    pub level: AlertLevel,
    pub pollutants: BTreeMap<Pollutant, PollutantState>,
    /// Number of accepted readings
    pub sequence: u64,
    /// Recent samples, oldest first, bounded by the tracker's history window
    pub history: Vec<LevelSample>,
}

impl StationSnapshot {
    /// Initial state for a station that has not reported yet
    pub fn initial(station_id: StationId, country_code: CountryCode) -> Self {
        Self {
            station_id,
            country_code,
            latest: None,
            level: AlertLevel::Green,
            pollutants: BTreeMap::new(),
            sequence: 0,
            history: Vec::new(),
        }
    }

    /// Sample describing the state right now
    pub fn current(&self) -> Option<&LevelSample> {
        self.history.last()
    }
}
