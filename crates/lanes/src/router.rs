//! Lane Router Implementation

use crate::error::LaneError;
use crate::queue::{StationQueue, DEFAULT_QUEUE_CAPACITY};
use aq_core::StationId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Pending items per station before the oldest is shed
    pub queue_capacity: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Sequential per-station work
///
/// A processor is owned by exactly one lane task, so it may hold the
/// station's mutable state without locks.
pub trait LaneProcessor: Send + 'static {
    type Item: Send + 'static;

    fn process(&mut self, item: Self::Item);
}

struct Lane<T> {
    queue: Arc<StationQueue<T>>,
    handle: JoinHandle<u64>,
}

/// Routes items to one lane per station, spawning lanes on first use
pub struct LaneRouter<P, F>
where
    P: LaneProcessor,
    F: Fn(&StationId) -> Result<P, LaneError> + Send + Sync,
{
    config: LaneConfig,
    factory: F,
    shutdown: watch::Receiver<bool>,
    lanes: Mutex<HashMap<StationId, Lane<P::Item>>>,
}

impl<P, F> LaneRouter<P, F>
where
    P: LaneProcessor,
    F: Fn(&StationId) -> Result<P, LaneError> + Send + Sync,
{
    /// Create a router; `factory` builds the processor for a new station
    /// or refuses stations it cannot serve
    pub fn new(config: LaneConfig, shutdown: watch::Receiver<bool>, factory: F) -> Self {
        info!("Creating lane router: queue capacity {}", config.queue_capacity);
        Self {
            config,
            factory,
            shutdown,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Queue an item on its station's lane
    ///
    /// Must be called within a tokio runtime. A full lane sheds its oldest
    /// item, which is counted and logged but not an error.
    pub fn route(&self, station: &StationId, item: P::Item) -> Result<(), LaneError> {
        if *self.shutdown.borrow() {
            return Err(LaneError::ShuttingDown);
        }

        let queue = {
            let mut lanes = self.lock();
            match lanes.get(station) {
                Some(lane) => lane.queue.clone(),
                None => {
                    let processor = (self.factory)(station)?;
                    let queue = Arc::new(StationQueue::new(self.config.queue_capacity));
                    let handle = spawn_lane(
                        station.clone(),
                        processor,
                        queue.clone(),
                        self.shutdown.clone(),
                    );
                    lanes.insert(
                        station.clone(),
                        Lane {
                            queue: queue.clone(),
                            handle,
                        },
                    );
                    debug!("Spawned lane for station {}", station);
                    queue
                }
            }
        };

        if queue.is_closed() {
            return Err(LaneError::Closed(station.clone()));
        }
        if queue.push(item).is_some() {
            metrics::counter!("aq_backlog_overflow_total", "station" => station.to_string())
                .increment(1);
            warn!(
                "Backlog overflow on station {}: dropped oldest pending reading ({} total)",
                station,
                queue.overflow_count()
            );
        }
        Ok(())
    }

    /// Number of spawned lanes
    pub fn lane_count(&self) -> usize {
        self.lock().len()
    }

    /// Items shed so far on a station's lane
    pub fn overflow_count(&self, station: &StationId) -> u64 {
        self.lock()
            .get(station)
            .map(|lane| lane.queue.overflow_count())
            .unwrap_or(0)
    }

    /// Close every lane, let queued items finish, and wait for the tasks
    ///
    /// Returns the number of items processed. Lanes stop early if the
    /// shutdown signal fires.
    pub async fn drain(&self) -> u64 {
        let lanes: Vec<(StationId, Lane<P::Item>)> = self.lock().drain().collect();
        for (_, lane) in &lanes {
            lane.queue.close();
        }

        let mut processed = 0;
        for (station, lane) in lanes {
            match lane.handle.await {
                Ok(count) => processed += count,
                Err(e) => warn!("Lane for station {} ended abnormally: {}", station, e),
            }
        }
        info!("Drained lanes: {} items processed", processed);
        processed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StationId, Lane<P::Item>>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_lane<P: LaneProcessor>(
    station: StationId,
    mut processor: P,
    queue: Arc<StationQueue<P::Item>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut processed = 0u64;
        loop {
            if *shutdown.borrow() {
                debug!("Lane {} stopping on shutdown", station);
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                item = queue.pop() => match item {
                    Some(item) => {
                        processor.process(item);
                        processed += 1;
                    }
                    None => break,
                },
            }
        }
        processed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        station: StationId,
        seen: Arc<Mutex<Vec<(StationId, u32)>>>,
    }

    impl LaneProcessor for Recorder {
        type Item = u32;

        fn process(&mut self, item: u32) {
            self.seen.lock().unwrap().push((self.station.clone(), item));
        }
    }

    fn station(id: &str) -> StationId {
        StationId::new(id).unwrap()
    }

    fn router(
        capacity: usize,
        seen: Arc<Mutex<Vec<(StationId, u32)>>>,
    ) -> (
        LaneRouter<Recorder, impl Fn(&StationId) -> Result<Recorder, LaneError> + Send + Sync>,
        watch::Sender<bool>,
    ) {
        let (tx, rx) = watch::channel(false);
        let router = LaneRouter::new(
            LaneConfig {
                queue_capacity: capacity,
            },
            rx,
            move |station: &StationId| {
                if station.as_str().starts_with("XX") {
                    return Err(LaneError::UnknownStation(station.clone()));
                }
                Ok(Recorder {
                    station: station.clone(),
                    seen: seen.clone(),
                })
            },
        );
        (router, tx)
    }

    #[tokio::test]
    async fn test_one_lane_per_station_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (router, _tx) = router(64, seen.clone());
        let dhaka = station("DHK-001");
        let kolkata = station("KOL-007");

        for i in 0..10 {
            router.route(&dhaka, i).unwrap();
            router.route(&kolkata, 100 + i).unwrap();
        }
        assert_eq!(router.lane_count(), 2);
        assert_eq!(router.drain().await, 20);

        let seen = seen.lock().unwrap();
        let dhaka_items: Vec<u32> = seen
            .iter()
            .filter(|(s, _)| s == &dhaka)
            .map(|(_, i)| *i)
            .collect();
        let kolkata_items: Vec<u32> = seen
            .iter()
            .filter(|(s, _)| s == &kolkata)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(dhaka_items, (0..10).collect::<Vec<_>>());
        assert_eq!(kolkata_items, (100..110).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_overflow_sheds_oldest() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (router, _tx) = router(3, seen.clone());
        let dhaka = station("DHK-001");

        // Nothing runs between these pushes on a current-thread runtime
        for i in 0..5 {
            router.route(&dhaka, i).unwrap();
        }
        assert_eq!(router.overflow_count(&dhaka), 2);
        router.drain().await;

        let items: Vec<u32> = seen.lock().unwrap().iter().map(|(_, i)| *i).collect();
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_refused_station_gets_no_lane() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (router, _tx) = router(8, seen);
        let unknown = station("XX-404");
        assert_eq!(
            router.route(&unknown, 1),
            Err(LaneError::UnknownStation(unknown.clone()))
        );
        assert_eq!(router.lane_count(), 0);
    }

    #[tokio::test]
    async fn test_route_after_shutdown_rejected() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (router, tx) = router(8, seen);
        let dhaka = station("DHK-001");
        router.route(&dhaka, 1).unwrap();

        tx.send(true).unwrap();
        assert_eq!(router.route(&dhaka, 2), Err(LaneError::ShuttingDown));
        router.drain().await;
        assert_eq!(router.lane_count(), 0);
    }
}
