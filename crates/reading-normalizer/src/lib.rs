//! Reading Normalization
//!
//! Converts heterogeneous per-country measurement records into canonical
//! readings: unified µg/m³ units, UTC instants, and a quality flag.

mod bounds;
mod error;
mod normalizer;
mod units;

pub use bounds::PlausibilityBounds;
pub use error::InvalidReading;
pub use normalizer::{Normalizer, NormalizerConfig};
pub use units::to_micrograms_per_cubic_meter;
