//! Physically plausible concentration bounds

use aq_core::Pollutant;
use serde::{Deserialize, Serialize};

/// Plausible ranges per pollutant (µg/m³)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlausibilityBounds {
    pub pm25_range: (f64, f64),
    pub pm10_range: (f64, f64),
    pub no2_range: (f64, f64),
    pub so2_range: (f64, f64),
    pub co_range: (f64, f64),
    pub o3_range: (f64, f64),
}

impl Default for PlausibilityBounds {
    fn default() -> Self {
        Self {
            pm25_range: (0.0, 1000.0),
            pm10_range: (0.0, 2000.0),
            no2_range: (0.0, 500.0),
            so2_range: (0.0, 1000.0),
            co_range: (0.0, 50_000.0),
            o3_range: (0.0, 500.0),
        }
    }
}

impl PlausibilityBounds {
    /// Range for a pollutant
    pub fn range(&self, pollutant: Pollutant) -> (f64, f64) {
        match pollutant {
            Pollutant::Pm25 => self.pm25_range,
            Pollutant::Pm10 => self.pm10_range,
            Pollutant::No2 => self.no2_range,
            Pollutant::So2 => self.so2_range,
            Pollutant::Co => self.co_range,
            Pollutant::O3 => self.o3_range,
        }
    }

    /// Whether a canonical value is plausible (inclusive bounds)
    pub fn is_plausible(&self, pollutant: Pollutant, value: f64) -> bool {
        let (min, max) = self.range(pollutant);
        value >= min && value <= max
    }
}
