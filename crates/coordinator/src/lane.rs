//! Per-station processing lane

use alerting::{AlertError, StationTracker, Transition};
use aq_core::{Clock, RawReading, StationId, StationSnapshot};
use lanes::LaneProcessor;
use reading_normalizer::Normalizer;
use staleness::StalenessDetector;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Sole writer of one station's state
///
/// normalize -> mark seen -> hysteresis -> publish snapshot -> signal change
pub struct StationLane {
    station: StationId,
    normalizer: Arc<Normalizer>,
    staleness: Arc<StalenessDetector>,
    tracker: StationTracker,
    clock: Arc<dyn Clock>,
    snapshot: Arc<watch::Sender<StationSnapshot>>,
    changes: mpsc::Sender<StationId>,
}

impl StationLane {
    pub fn new(
        tracker: StationTracker,
        normalizer: Arc<Normalizer>,
        staleness: Arc<StalenessDetector>,
        clock: Arc<dyn Clock>,
        snapshot: Arc<watch::Sender<StationSnapshot>>,
        changes: mpsc::Sender<StationId>,
    ) -> Self {
        Self {
            station: tracker.snapshot().station_id,
            normalizer,
            staleness,
            tracker,
            clock,
            snapshot,
            changes,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.tracker.snapshot());
        match self.changes.try_send(self.station.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(
                    "Change queue full; station {} will be reconciled on the next tick",
                    self.station
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Reconcile loop gone, station {} change not signalled", self.station);
            }
        }
    }
}

impl LaneProcessor for StationLane {
    type Item = RawReading;

    fn process(&mut self, raw: RawReading) {
        let result = self.normalizer.normalize(&raw, self.clock.now());
        if let Ok(reading) = &result {
            self.staleness.observe(&reading.station_id, reading.received_at);
        }

        match self.tracker.apply_result(result) {
            Ok(Transition::Duplicate) => {
                metrics::counter!("aq_readings_replayed_total").increment(1);
            }
            Ok(transition) => {
                metrics::counter!("aq_readings_accepted_total").increment(1);
                debug!("Station {} reading applied: {:?}", self.station, transition);
                self.publish();
            }
            Err(AlertError::DataQuality(e)) => {
                metrics::counter!("aq_readings_rejected_total", "reason" => e.reason())
                    .increment(1);
            }
            Err(e) => {
                warn!("Station {} lane rejected reading: {}", self.station, e);
                metrics::counter!("aq_readings_rejected_total", "reason" => "wrong_station")
                    .increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::AlertConfig;
    use aq_core::{AlertLevel, CountryCode, ManualClock};
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 2, 6, 0, 0).unwrap()
    }

    fn raw(value: f64, observed_at: &str) -> RawReading {
        RawReading {
            station_id: "DHK-001".to_string(),
            country_code: "BD".to_string(),
            pollutant: "pm25".to_string(),
            value: Some(value),
            unit: "ug/m3".to_string(),
            observed_at: observed_at.to_string(),
            received_at: None,
        }
    }

    struct Harness {
        lane: StationLane,
        snapshot: watch::Receiver<StationSnapshot>,
        changes: mpsc::Receiver<StationId>,
        staleness: Arc<StalenessDetector>,
    }

    fn harness() -> Harness {
        let station = StationId::new("DHK-001").unwrap();
        let country = CountryCode::new("BD").unwrap();
        let (snapshot_tx, snapshot) =
            watch::channel(StationSnapshot::initial(station.clone(), country.clone()));
        let (changes_tx, changes) = mpsc::channel(8);
        let staleness = Arc::new(StalenessDetector::default());
        let lane = StationLane::new(
            StationTracker::new(station, country, Arc::new(AlertConfig::default())),
            Arc::new(Normalizer::default()),
            staleness.clone(),
            Arc::new(ManualClock::new(t0())),
            Arc::new(snapshot_tx),
            changes_tx,
        );
        Harness {
            lane,
            snapshot,
            changes,
            staleness,
        }
    }

    #[test]
    fn test_accepted_reading_published() {
        let mut h = harness();
        h.lane.process(raw(287.0, "2024-11-02T06:00:00Z"));

        let snapshot = h.snapshot.borrow().clone();
        assert_eq!(snapshot.level, AlertLevel::Red);
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(h.changes.try_recv().unwrap().as_str(), "DHK-001");
        assert!(h
            .staleness
            .last_seen(&StationId::new("DHK-001").unwrap())
            .is_some());
    }

    #[test]
    fn test_invalid_reading_leaves_state_untouched() {
        let mut h = harness();
        h.lane.process(raw(-5.0, "2024-11-02T06:00:00Z"));

        let snapshot = h.snapshot.borrow().clone();
        assert_eq!(snapshot.level, AlertLevel::Green);
        assert_eq!(snapshot.sequence, 0);
        assert!(snapshot.latest.is_none());
        assert!(h.changes.try_recv().is_err());
    }

    #[test]
    fn test_replay_not_republished() {
        let mut h = harness();
        h.lane.process(raw(287.0, "2024-11-02T06:00:00Z"));
        let first = h.snapshot.borrow().clone();
        let _ = h.changes.try_recv();

        h.lane.process(raw(287.0, "2024-11-02T06:00:00Z"));
        assert_eq!(*h.snapshot.borrow(), first);
        assert!(h.changes.try_recv().is_err());
    }
}
