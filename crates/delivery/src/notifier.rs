//! Downstream collaborators

use crate::error::{DeliveryFailure, NotifyError};
use crate::tracker::DeliveryRecord;
use async_trait::async_trait;
use aq_core::CoordinationEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Downstream notifier (SMS, push, dashboard, broker)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event; `Ok` is the downstream ack
    async fn notify(&self, event: &CoordinationEvent) -> Result<(), NotifyError>;
}

/// An event that could not be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDelivery {
    pub event: CoordinationEvent,
    pub record: DeliveryRecord,
    pub reason: DeliveryFailure,
}

/// Operator-facing queue of failed deliveries
#[async_trait]
pub trait FailureQueue: Send + Sync {
    async fn push(&self, failed: FailedDelivery);
}

/// Failure queue backed by a tokio channel
pub struct ChannelFailureQueue {
    tx: mpsc::Sender<FailedDelivery>,
}

impl ChannelFailureQueue {
    /// Create the queue and its receiving end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FailedDelivery>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FailureQueue for ChannelFailureQueue {
    async fn push(&self, failed: FailedDelivery) {
        let event_id = failed.event.event_id;
        if self.tx.send(failed).await.is_err() {
            warn!("Failure queue closed, dropping failed delivery {}", event_id);
        }
    }
}
