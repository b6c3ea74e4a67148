//! Lane Error Types

use aq_core::StationId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaneError {
    #[error("Lanes are shutting down")]
    ShuttingDown,

    #[error("No lane can serve station {0}")]
    UnknownStation(StationId),

    #[error("Lane for station {0} is closed")]
    Closed(StationId),
}
