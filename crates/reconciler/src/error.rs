//! Reconciliation Error Types

use aq_core::{CoreError, StationId};
use staleness::Freshness;
use thiserror::Error;

/// Reconciliation failures; all are recovered by skipping the pair
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    /// One side cannot act as a pairing partner
    #[error("Insufficient data: station {station} is {freshness}")]
    InsufficientData {
        station: StationId,
        freshness: Freshness,
    },

    /// Snapshot does not belong to the configured pair member
    #[error("Snapshot for {got} supplied where {expected} was expected")]
    PairMismatch { expected: StationId, got: StationId },

    /// Event identity could not be derived
    #[error("Event identity error: {0}")]
    Identity(#[from] CoreError),
}
