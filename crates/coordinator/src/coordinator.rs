//! Service wiring

use crate::error::{ConfigError, IngestError};
use crate::lane::StationLane;
use crate::settings::{RuntimeSettings, Settings};
use alerting::StationTracker;
use aq_core::{Clock, CoordinationEvent, CountryCode, RawReading, StationId, StationSnapshot};
use chrono::{DateTime, Utc};
use delivery::{DeliveryTracker, FailureQueue, Notifier};
use lanes::{LaneError, LaneRouter};
use reading_normalizer::Normalizer;
use reconciler::{PairSide, ReconcileError, Reconciler, StationPair, TransportModel};
use staleness::{Freshness, StalenessDetector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type LaneFactory = Box<dyn Fn(&StationId) -> Result<StationLane, LaneError> + Send + Sync>;

/// External collaborators injected at startup
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub transport: Arc<dyn TransportModel>,
    pub notifier: Arc<dyn Notifier>,
    pub failures: Arc<dyn FailureQueue>,
}

/// State shared by the reconcile loop and callers
struct Shared {
    pairs: Vec<StationPair>,
    snapshots: HashMap<StationId, watch::Receiver<StationSnapshot>>,
    staleness: Arc<StalenessDetector>,
    reconciler: Reconciler,
    delivery: Arc<DeliveryTracker>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    /// Copy a station's state and freshness at a single instant
    fn side(&self, station: &StationId, now: DateTime<Utc>) -> Option<PairSide> {
        let snapshot = self.snapshots.get(station)?.borrow().clone();
        Some(PairSide::new(snapshot, self.staleness.check(station, now)))
    }

    fn reconcile_pair(&self, pair: &StationPair, dispatches: &mut JoinSet<()>) {
        let now = self.clock.now();
        let (Some(a), Some(b)) = (
            self.side(&pair.station_a, now),
            self.side(&pair.station_b, now),
        ) else {
            warn!("Pair {} references an unregistered station", pair.id);
            return;
        };

        match self.reconciler.reconcile(pair, &a, &b) {
            Ok(Some(event)) => self.dispatch(event, dispatches),
            Ok(None) => debug!("Pair {}: nothing to coordinate", pair.id),
            Err(ReconcileError::InsufficientData { station, freshness }) => {
                info!(
                    "Pair {}: cross-border attribution unavailable, station {} is {}",
                    pair.id, station, freshness
                );
            }
            Err(e) => warn!("Pair {}: reconciliation failed: {}", pair.id, e),
        }
    }

    fn reconcile_station(&self, station: &StationId, dispatches: &mut JoinSet<()>) {
        for pair in self.pairs.iter().filter(|pair| pair.contains(station)) {
            self.reconcile_pair(pair, dispatches);
        }
    }

    fn reconcile_all(&self, dispatches: &mut JoinSet<()>) {
        for pair in &self.pairs {
            self.reconcile_pair(pair, dispatches);
        }
    }

    fn dispatch(&self, event: CoordinationEvent, dispatches: &mut JoinSet<()>) {
        if self.delivery.is_known(&event.event_id) {
            debug!("Event {} already handed to delivery", event.event_id);
            return;
        }

        info!(
            "Coordination event {} for pair {}: severity {}, levels {}/{}, transboundary {:.2}",
            event.event_id,
            event.pair_id,
            event.severity,
            event.levels.0,
            event.levels.1,
            event.transboundary_estimate
        );
        let delivery = self.delivery.clone();
        dispatches.spawn(async move {
            delivery.dispatch(&event).await;
        });
    }

    fn housekeeping(&self) {
        let now = self.clock.now();
        let missing = self.staleness.sweep(now);
        if !missing.is_empty() {
            debug!("{} station(s) missing", missing.len());
        }
        self.delivery.evict_expired(now);
    }
}

/// Running coordination service
pub struct Coordinator {
    shared: Arc<Shared>,
    router: LaneRouter<StationLane, LaneFactory>,
    shutdown_tx: watch::Sender<bool>,
    reconcile_task: JoinHandle<()>,
}

impl Coordinator {
    /// Validate settings and start lanes and the reconcile loop
    ///
    /// Must be called within a tokio runtime.
    pub fn start(settings: &Settings, collaborators: Collaborators) -> Result<Self, ConfigError> {
        settings.validate()?;
        let registry = settings.station_registry()?;
        let Collaborators {
            clock,
            transport,
            notifier,
            failures,
        } = collaborators;

        let normalizer = Arc::new(Normalizer::new(settings.normalizer.clone()));
        let staleness = Arc::new(StalenessDetector::new(settings.staleness.clone()));
        let alert_config = Arc::new(settings.alerting.clone());

        let mut publishers: HashMap<StationId, (CountryCode, Arc<watch::Sender<StationSnapshot>>)> =
            HashMap::new();
        let mut snapshots = HashMap::new();
        for (station, country) in registry {
            let (tx, rx) = watch::channel(StationSnapshot::initial(station.clone(), country.clone()));
            publishers.insert(station.clone(), (country, Arc::new(tx)));
            snapshots.insert(station, rx);
        }

        let (changes_tx, changes_rx) = mpsc::channel(settings.runtime.change_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let factory: LaneFactory = {
            let normalizer = normalizer.clone();
            let staleness = staleness.clone();
            let clock = clock.clone();
            Box::new(move |station: &StationId| -> Result<StationLane, LaneError> {
                let (country, publisher) = publishers
                    .get(station)
                    .ok_or_else(|| LaneError::UnknownStation(station.clone()))?;
                Ok(StationLane::new(
                    StationTracker::new(station.clone(), country.clone(), alert_config.clone()),
                    normalizer.clone(),
                    staleness.clone(),
                    clock.clone(),
                    publisher.clone(),
                    changes_tx.clone(),
                ))
            })
        };
        let router = LaneRouter::new(settings.lanes.clone(), shutdown_rx.clone(), factory);

        let delivery = Arc::new(DeliveryTracker::new(
            settings.delivery.clone(),
            notifier,
            failures,
            clock.clone(),
        ));
        let shared = Arc::new(Shared {
            pairs: settings.pairs.clone(),
            snapshots,
            staleness,
            reconciler: Reconciler::new(settings.reconciler.clone(), transport),
            delivery,
            clock,
        });

        let reconcile_task = tokio::spawn(reconcile_loop(
            shared.clone(),
            changes_rx,
            shutdown_rx,
            settings.runtime.clone(),
        ));

        info!(
            "Coordinator started: {} pairs, {} stations",
            shared.pairs.len(),
            shared.snapshots.len()
        );
        Ok(Self {
            shared,
            router,
            shutdown_tx,
            reconcile_task,
        })
    }

    /// Hand a raw reading to its station's lane
    pub fn submit(&self, raw: RawReading) -> Result<(), IngestError> {
        let result = StationId::new(raw.station_id.clone())
            .map_err(IngestError::from)
            .and_then(|station| {
                self.router
                    .route(&station, raw)
                    .map_err(IngestError::from)
            });
        if let Err(e) = &result {
            metrics::counter!("aq_readings_rejected_total", "reason" => e.reason()).increment(1);
        }
        result
    }

    /// Latest published state of a station
    pub fn snapshot(&self, station: &StationId) -> Option<StationSnapshot> {
        self.shared
            .snapshots
            .get(station)
            .map(|rx| rx.borrow().clone())
    }

    /// Freshness of a station now
    pub fn freshness(&self, station: &StationId) -> Freshness {
        self.shared
            .staleness
            .check(station, self.shared.clock.now())
    }

    pub fn delivery(&self) -> &DeliveryTracker {
        &self.shared.delivery
    }

    /// Ask lanes and the reconcile loop to stop at the next opportunity
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Finish queued work and stop
    ///
    /// Lanes drain their queues (or stop between items after
    /// [`trigger_shutdown`](Self::trigger_shutdown)), the last state changes
    /// are reconciled, and in-flight dispatches get the grace period.
    pub async fn shutdown(self) {
        let processed = self.router.drain().await;
        debug!("Lanes processed {} readings before shutdown", processed);

        // Dropping the router releases the last change sender
        drop(self.router);
        if let Err(e) = self.reconcile_task.await {
            warn!("Reconcile loop ended abnormally: {}", e);
        }
        self.shutdown_tx.send_replace(true);
        info!("Coordinator stopped");
    }
}

async fn reconcile_loop(
    shared: Arc<Shared>,
    mut changes: mpsc::Receiver<StationId>,
    mut shutdown: watch::Receiver<bool>,
    runtime: RuntimeSettings,
) {
    let mut dispatches = JoinSet::new();
    let mut tick = tokio::time::interval(runtime.tick());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Reconcile loop stopping on shutdown");
                    break;
                }
            }
            station = changes.recv() => match station {
                Some(station) => shared.reconcile_station(&station, &mut dispatches),
                None => {
                    debug!("All lanes closed, reconcile loop finishing");
                    break;
                }
            },
            _ = tick.tick() => {
                shared.housekeeping();
                shared.reconcile_all(&mut dispatches);
            }
            Some(joined) = dispatches.join_next() => {
                if let Err(e) = joined {
                    warn!("Dispatch task failed: {}", e);
                }
            }
        }
    }

    if dispatches.is_empty() {
        return;
    }
    info!(
        "Waiting up to {}s for {} in-flight dispatches",
        runtime.shutdown_grace_secs,
        dispatches.len()
    );
    let finished = tokio::time::timeout(runtime.shutdown_grace(), async {
        while dispatches.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!(
            "Aborting {} dispatches still in flight after grace period",
            dispatches.len()
        );
        dispatches.abort_all();
    }
}
