//! Delivery Tracker Implementation

use crate::error::{DeliveryFailure, NotifyError};
use crate::notifier::{FailedDelivery, FailureQueue, Notifier};
use crate::retry::RetryPolicy;
use aq_core::{Clock, CoordinationEvent, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Per-call notifier timeout (seconds)
    pub call_timeout_secs: u64,
    /// How long delivery records are kept (seconds)
    pub retention_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 10,
            retention_secs: 24 * 3600,
            retry: RetryPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        clamped_seconds(self.retention_secs)
    }

    /// Idle time after which a delivery with no outcome counts as abandoned
    ///
    /// A running delivery starts an attempt at least every backoff cap plus
    /// call timeout, so only cancelled ones stay idle longer than this.
    pub fn abandon_after(&self) -> chrono::Duration {
        clamped_seconds(
            self.retention_secs
                .saturating_add(self.call_timeout_secs)
                .saturating_add(self.retry.max_interval_secs),
        )
    }
}

// chrono rejects durations beyond i64::MAX milliseconds.
fn clamped_seconds(seconds: u64) -> chrono::Duration {
    chrono::Duration::seconds(seconds.min(i64::MAX as u64 / 1000) as i64)
}

/// Delivery bookkeeping for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub event_id: EventId,
    pub dispatch_attempts: u32,
    pub first_dispatched_at: DateTime<Utc>,
    /// Start of the most recent notifier call
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    /// Set once the event is given up on
    pub failure: Option<DeliveryFailure>,
}

impl DeliveryRecord {
    fn new(event_id: EventId, first_dispatched_at: DateTime<Utc>) -> Self {
        Self {
            event_id,
            dispatch_attempts: 0,
            first_dispatched_at,
            last_attempt_at: None,
            acknowledged: false,
            failure: None,
        }
    }
}

/// What every `dispatch` call for an event observes
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Acknowledged,
    Failed(DeliveryFailure),
}

impl DispatchOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, DispatchOutcome::Acknowledged)
    }
}

struct Delivery {
    record: Mutex<DeliveryRecord>,
    outcome: OnceCell<DispatchOutcome>,
}

impl Delivery {
    fn record(&self) -> MutexGuard<'_, DeliveryRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Idempotent dispatcher
///
/// The first `dispatch` for an event id runs the delivery; every other call,
/// concurrent or later, waits for and returns that same outcome. If the
/// running call is cancelled before it completes, the next caller takes over.
pub struct DeliveryTracker {
    config: DeliveryConfig,
    notifier: Arc<dyn Notifier>,
    failures: Arc<dyn FailureQueue>,
    clock: Arc<dyn Clock>,
    deliveries: Mutex<HashMap<EventId, Arc<Delivery>>>,
}

impl DeliveryTracker {
    /// Create a tracker
    pub fn new(
        config: DeliveryConfig,
        notifier: Arc<dyn Notifier>,
        failures: Arc<dyn FailureQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "Creating delivery tracker: {} attempts, {}s timeout, {}s retention",
            config.retry.max_attempts, config.call_timeout_secs, config.retention_secs
        );
        Self {
            config,
            notifier,
            failures,
            clock,
            deliveries: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch an event at most once
    pub async fn dispatch(&self, event: &CoordinationEvent) -> DispatchOutcome {
        let delivery = {
            let mut deliveries = self.lock();
            deliveries
                .entry(event.event_id)
                .or_insert_with(|| {
                    Arc::new(Delivery {
                        record: Mutex::new(DeliveryRecord::new(event.event_id, self.clock.now())),
                        outcome: OnceCell::new(),
                    })
                })
                .clone()
        };

        if let Some(outcome) = delivery.outcome.get() {
            debug!("Event {} already delivered, skipping", event.event_id);
            return outcome.clone();
        }

        delivery
            .outcome
            .get_or_init(|| self.deliver(event, &delivery))
            .await
            .clone()
    }

    async fn deliver(&self, event: &CoordinationEvent, delivery: &Delivery) -> DispatchOutcome {
        let policy = &self.config.retry;
        let mut attempt = delivery.record().dispatch_attempts;

        let failure = loop {
            attempt += 1;
            let delay = policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            {
                let mut record = delivery.record();
                record.dispatch_attempts = attempt;
                record.last_attempt_at = Some(self.clock.now());
            }
            metrics::counter!("aq_dispatch_attempts_total").increment(1);

            let result = match tokio::time::timeout(
                self.config.call_timeout(),
                self.notifier.notify(event),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Transient(format!(
                    "no answer within {}s",
                    self.config.call_timeout_secs
                ))),
            };

            match result {
                Ok(()) => {
                    delivery.record().acknowledged = true;
                    info!(
                        "Event {} for pair {} acknowledged after {} attempt(s)",
                        event.event_id, event.pair_id, attempt
                    );
                    return DispatchOutcome::Acknowledged;
                }
                Err(NotifyError::Transient(reason)) if policy.has_attempts_remaining(attempt) => {
                    warn!(
                        "Attempt {}/{} for event {} failed: {}",
                        attempt, policy.max_attempts, event.event_id, reason
                    );
                }
                Err(NotifyError::Transient(reason)) => {
                    break DeliveryFailure::Exhausted {
                        attempts: attempt,
                        last_error: reason,
                    };
                }
                Err(NotifyError::Permanent(reason)) => break DeliveryFailure::Rejected(reason),
            }
        };

        let record = {
            let mut record = delivery.record();
            record.failure = Some(failure.clone());
            record.clone()
        };
        metrics::counter!("aq_dispatch_failed_total", "kind" => failure.kind()).increment(1);
        error!("Giving up on event {}: {}", event.event_id, failure);

        self.failures
            .push(FailedDelivery {
                event: event.clone(),
                record,
                reason: failure.clone(),
            })
            .await;

        DispatchOutcome::Failed(failure)
    }

    /// Snapshot of an event's delivery record
    pub fn record(&self, event_id: &EventId) -> Option<DeliveryRecord> {
        self.lock()
            .get(event_id)
            .map(|delivery| delivery.record().clone())
    }

    /// Whether an event has been seen within the retention window
    pub fn is_known(&self, event_id: &EventId) -> bool {
        self.lock().contains_key(event_id)
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop finished records older than the retention window, and records
    /// whose delivery was cancelled before reaching an outcome once they sat
    /// idle past [`DeliveryConfig::abandon_after`].
    ///
    /// Returns the number of evicted records. Running deliveries are kept.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let (Some(cutoff), Some(abandoned_before)) = (
            now.checked_sub_signed(self.config.retention()),
            now.checked_sub_signed(self.config.abandon_after()),
        ) else {
            return 0;
        };
        let mut deliveries = self.lock();
        let before = deliveries.len();
        deliveries.retain(|_, delivery| {
            let record = delivery.record();
            if delivery.outcome.initialized() {
                record.first_dispatched_at >= cutoff
            } else {
                record.last_attempt_at.unwrap_or(record.first_dispatched_at) >= abandoned_before
            }
        });
        let evicted = before - deliveries.len();
        if evicted > 0 {
            debug!("Evicted {} delivery records older than {}", evicted, cutoff);
        }
        evicted
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventId, Arc<Delivery>>> {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
