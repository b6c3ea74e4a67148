//! Delivery Tracker
//!
//! Turns coordination events into downstream notifications with:
//! - idempotent dispatch keyed by event id
//! - exponential backoff on transient failures
//! - an operator failure queue for exhausted or rejected deliveries
//! - bounded retention of delivery records

mod error;
mod notifier;
mod retry;
mod tracker;

pub use error::{DeliveryFailure, NotifyError};
pub use notifier::{ChannelFailureQueue, FailedDelivery, FailureQueue, Notifier};
pub use retry::RetryPolicy;
pub use tracker::{DeliveryConfig, DeliveryRecord, DeliveryTracker, DispatchOutcome};
