//! Alerting System
//!
//! Maps each station's reading sequence to a discrete alert level. Upgrades
//! are immediate; downgrades wait out a dwell time below a lower exit bar so
//! levels do not flap around a single threshold.

mod error;
mod thresholds;
mod tracker;

pub use error::{AlertError, ThresholdError};
pub use thresholds::{Band, LevelThresholds, ThresholdTable};
pub use tracker::{AlertConfig, StationTracker, Transition, MAX_HISTORY_SAMPLES};
