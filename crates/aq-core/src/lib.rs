//! Air-Quality Coordination Core Types
//!
//! Shared data model for the cross-border coordination pipeline: station
//! identities, readings, alert levels, snapshots and coordination events.

mod clock;
mod error;
mod event;
mod level;
mod reading;
mod station;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use event::{Attribution, CoordinationEvent, EventId, EventIdentity, PolicyAction, Side};
pub use level::AlertLevel;
pub use reading::{Pollutant, QualityFlag, RawReading, Reading, Unit};
pub use station::{
    CountryCode, LevelSample, PollutantState, PollutantValue, StationId, StationSnapshot,
};
