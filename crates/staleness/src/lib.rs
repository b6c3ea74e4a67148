//! Staleness & Gap Detection
//!
//! Tracks when each station was last heard from and classifies it as
//! fresh, stale or missing, so a silent sensor is never mistaken for
//! clean air.

mod detector;

pub use detector::{Freshness, StalenessConfig, StalenessDetector};
