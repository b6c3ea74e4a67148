//! Station Lanes
//!
//! Single-writer-per-station scheduling: readings are partitioned by
//! station id onto one sequential task each, fed by a bounded queue that
//! sheds its oldest entry when full.

mod error;
mod queue;
mod router;

pub use error::LaneError;
pub use queue::{StationQueue, DEFAULT_QUEUE_CAPACITY};
pub use router::{LaneConfig, LaneProcessor, LaneRouter};
