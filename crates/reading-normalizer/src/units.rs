//! Unit conversion to µg/m³

use aq_core::{Pollutant, Unit};

/// Molar volume of an ideal gas at 25 °C and 1 atm (L/mol)
const MOLAR_VOLUME_L: f64 = 24.45;

/// Convert a measurement to µg/m³.
///
/// Returns `None` when the unit cannot express the pollutant: mixing
/// ratios (ppb, ppm) have no meaning for particulate matter.
pub fn to_micrograms_per_cubic_meter(pollutant: Pollutant, value: f64, unit: Unit) -> Option<f64> {
    match unit {
        Unit::MicrogramsPerCubicMeter => Some(value),
        Unit::MilligramsPerCubicMeter => Some(value * 1000.0),
        Unit::PartsPerBillion => pollutant
            .molecular_weight()
            .map(|mw| value * mw / MOLAR_VOLUME_L),
        Unit::PartsPerMillion => pollutant
            .molecular_weight()
            .map(|mw| value * 1000.0 * mw / MOLAR_VOLUME_L),
    }
}
