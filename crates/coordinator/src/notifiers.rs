//! Downstream notifiers

use crate::settings::MqttSettings;
use async_trait::async_trait;
use aq_core::CoordinationEvent;
use delivery::{NotifyError, Notifier};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Writes events to the log; always acknowledges
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &CoordinationEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(event).map_err(|e| NotifyError::Permanent(e.to_string()))?;
        info!(target: "aq::coordination", "{}", payload);
        Ok(())
    }
}

/// Matches broker PUBACKs to the publishes waiting on them.
///
/// The event loop reports outgoing publishes in request order, so waiters
/// queued in that order are bound to packet ids as the ids are assigned.
/// A packet id seen again before its ack is a retransmission.
#[derive(Default)]
struct PublishAcks {
    inner: Mutex<AckState>,
}

#[derive(Default)]
struct AckState {
    queued: VecDeque<oneshot::Sender<()>>,
    in_flight: HashMap<u16, oneshot::Sender<()>>,
}

impl PublishAcks {
    fn lock(&self) -> MutexGuard<'_, AckState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a waiter for the next publish request
    fn register(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().queued.push_back(tx);
        rx
    }

    /// Withdraw the waiter queued last, for a request that was never sent
    fn withdraw_last(&self) {
        self.lock().queued.pop_back();
    }

    fn on_outgoing_publish(&self, pkid: u16) {
        let mut state = self.lock();
        if state.in_flight.contains_key(&pkid) {
            debug!("MQTT retransmitting packet {}", pkid);
            return;
        }
        match state.queued.pop_front() {
            Some(waiter) => {
                state.in_flight.insert(pkid, waiter);
            }
            None => warn!("MQTT publish {} has no waiter", pkid),
        }
    }

    fn on_puback(&self, pkid: u16) {
        if let Some(waiter) = self.lock().in_flight.remove(&pkid) {
            // The caller may have timed out already
            let _ = waiter.send(());
        }
    }

    fn observe(&self, event: &Event) {
        match event {
            Event::Outgoing(Outgoing::Publish(pkid)) => self.on_outgoing_publish(*pkid),
            Event::Incoming(Packet::PubAck(ack)) => self.on_puback(ack.pkid),
            Event::Incoming(incoming) => debug!("MQTT incoming: {:?}", incoming),
            Event::Outgoing(_) => {}
        }
    }
}

/// Publishes events as JSON to an MQTT broker.
///
/// A publish succeeds only once the broker acknowledges it (QoS 1); the
/// delivery tracker's call timeout bounds the wait.
pub struct MqttNotifier {
    client: AsyncClient,
    topic_prefix: String,
    acks: Arc<PublishAcks>,
    /// Keeps waiter order equal to request order
    publish_order: tokio::sync::Mutex<()>,
}

impl MqttNotifier {
    /// Create the client and start its event loop
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));

        let (client, mut eventloop) = AsyncClient::new(options, 32);
        let acks = Arc::new(PublishAcks::default());

        let observer = acks.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => observer.observe(&event),
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!(
            "MQTT notifier targeting {}:{} under '{}/'",
            settings.host, settings.port, settings.topic_prefix
        );
        Self {
            client,
            topic_prefix: settings.topic_prefix.clone(),
            acks,
            publish_order: tokio::sync::Mutex::new(()),
        }
    }

    fn topic(&self, event: &CoordinationEvent) -> String {
        format!("{}/{}/events", self.topic_prefix, event.pair_id)
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn notify(&self, event: &CoordinationEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_vec(event).map_err(|e| NotifyError::Permanent(e.to_string()))?;

        let acked = {
            let _order = self.publish_order.lock().await;
            let acked = self.acks.register();
            if let Err(e) = self
                .client
                .publish(self.topic(event), QoS::AtLeastOnce, false, payload)
                .await
            {
                self.acks.withdraw_last();
                return Err(NotifyError::Transient(e.to_string()));
            }
            acked
        };

        acked
            .await
            .map_err(|_| NotifyError::Transient("publish was not acknowledged".to_string()))
    }
}
