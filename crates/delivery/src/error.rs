//! Delivery Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Downstream notifier answer other than an ack
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Worth retrying (network blip, timeout, 5xx)
    #[error("Transient dispatch failure: {0}")]
    Transient(String),

    /// Retrying will not help (rejected payload, unknown recipient)
    #[error("Permanent dispatch failure: {0}")]
    Permanent(String),
}

impl NotifyError {
    /// Whether the backoff policy applies
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transient(_))
    }
}

/// Terminal reason a delivery did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum DeliveryFailure {
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Rejected downstream: {0}")]
    Rejected(String),
}

impl DeliveryFailure {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryFailure::Exhausted { .. } => "exhausted",
            DeliveryFailure::Rejected(_) => "rejected",
        }
    }
}
