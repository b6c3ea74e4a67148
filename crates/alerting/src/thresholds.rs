//! Dual-threshold tables

use crate::error::ThresholdError;
use aq_core::{AlertLevel, Pollutant};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Entry and exit bars for one level (µg/m³)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Exceeding this moves the station up into the level
    pub enter: f64,
    /// Staying below this for the dwell time lets the station leave the level
    pub exit: f64,
}

impl Band {
    /// Create a band
    pub const fn new(enter: f64, exit: f64) -> Self {
        Self { enter, exit }
    }
}

/// Bars for every elevated level of one pollutant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub yellow: Band,
    pub orange: Band,
    pub red: Band,
}

impl LevelThresholds {
    /// PM2.5 bars on the AQI breakpoints used by the regional dashboards
    pub const PM25: LevelThresholds = LevelThresholds {
        yellow: Band::new(55.4, 45.0),
        orange: Band::new(150.4, 125.0),
        red: Band::new(250.4, 210.0),
    };

    /// PM10 bars
    pub const PM10: LevelThresholds = LevelThresholds {
        yellow: Band::new(154.0, 125.0),
        orange: Band::new(254.0, 210.0),
        red: Band::new(354.0, 300.0),
    };

    /// Band for a level; Green has none
    pub fn band(&self, level: AlertLevel) -> Option<Band> {
        match level {
            AlertLevel::Green => None,
            AlertLevel::Yellow => Some(self.yellow),
            AlertLevel::Orange => Some(self.orange),
            AlertLevel::Red => Some(self.red),
        }
    }

    /// Highest level whose entry bar the value exceeds
    pub fn entry_level(&self, value: f64) -> AlertLevel {
        AlertLevel::ELEVATED
            .iter()
            .rev()
            .copied()
            .find(|level| self.band(*level).is_some_and(|band| value > band.enter))
            .unwrap_or(AlertLevel::Green)
    }

    /// Highest level whose exit bar the value still meets
    pub fn retained_level(&self, value: f64) -> AlertLevel {
        AlertLevel::ELEVATED
            .iter()
            .rev()
            .copied()
            .find(|level| self.band(*level).is_some_and(|band| value >= band.exit))
            .unwrap_or(AlertLevel::Green)
    }

    /// Check that every exit sits below its entry and bars rise with level
    pub fn validate(&self) -> Result<(), ThresholdError> {
        let bands = [
            (AlertLevel::Yellow, self.yellow),
            (AlertLevel::Orange, self.orange),
            (AlertLevel::Red, self.red),
        ];

        for (level, band) in bands {
            let in_range = |v: f64| v.is_finite() && v >= 0.0;
            if !in_range(band.enter) || !in_range(band.exit) {
                return Err(ThresholdError::OutOfRange { level });
            }
            if band.exit >= band.enter {
                return Err(ThresholdError::ExitNotBelowEnter {
                    level,
                    enter: band.enter,
                    exit: band.exit,
                });
            }
        }

        for pair in bands.windows(2) {
            let (lower, low) = pair[0];
            let (upper, high) = pair[1];
            if high.enter <= low.enter {
                return Err(ThresholdError::NotIncreasing {
                    field: "enter",
                    lower,
                    upper,
                });
            }
            if high.exit <= low.exit {
                return Err(ThresholdError::NotIncreasing {
                    field: "exit",
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}

/// Thresholds per pollutant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    tables: HashMap<Pollutant, LevelThresholds>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let mut tables = HashMap::new();
        tables.insert(Pollutant::Pm25, LevelThresholds::PM25);
        tables.insert(Pollutant::Pm10, LevelThresholds::PM10);
        Self { tables }
    }
}

impl ThresholdTable {
    /// Build a validated table
    pub fn new(tables: HashMap<Pollutant, LevelThresholds>) -> Result<Self, ThresholdError> {
        let table = Self { tables };
        table.validate()?;
        Ok(table)
    }

    /// Thresholds for a pollutant, if configured
    pub fn get(&self, pollutant: Pollutant) -> Option<&LevelThresholds> {
        self.tables.get(&pollutant)
    }

    /// Add or replace a pollutant's thresholds
    pub fn insert(
        &mut self,
        pollutant: Pollutant,
        thresholds: LevelThresholds,
    ) -> Result<(), ThresholdError> {
        thresholds.validate()?;
        self.tables.insert(pollutant, thresholds);
        Ok(())
    }

    /// Validate every configured pollutant
    pub fn validate(&self) -> Result<(), ThresholdError> {
        self.tables.values().try_for_each(LevelThresholds::validate)
    }
}
