//! Staleness Detector Implementation
//!
//! All checks take `now` explicitly; nothing here reads the wall clock.

use aq_core::StationId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Freshness classification of a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

impl Freshness {
    /// Whether the station can act as a pairing partner
    pub fn is_reliable(&self) -> bool {
        !matches!(self, Freshness::Missing)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
            Freshness::Missing => write!(f, "missing"),
        }
    }
}

/// Staleness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    /// Expected reporting interval per station (seconds)
    pub expected_interval_seconds: u64,
    /// Multiple of the interval after which a station is stale
    pub stale_after_intervals: u32,
    /// Multiple of the interval after which a station is missing
    pub missing_after_intervals: u32,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            expected_interval_seconds: 300, // 5 minutes
            stale_after_intervals: 2,
            missing_after_intervals: 10,
        }
    }
}

impl StalenessConfig {
    /// Age beyond which a station is stale
    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.expected_interval_seconds as i64 * self.stale_after_intervals as i64)
    }

    /// Age beyond which a station is missing
    pub fn missing_after(&self) -> Duration {
        Duration::seconds(
            self.expected_interval_seconds as i64 * self.missing_after_intervals as i64,
        )
    }
}

#[derive(Debug, Clone)]
struct StationClock {
    last_seen: DateTime<Utc>,
    /// Last classification reported, for transition advisories
    reported: Freshness,
}

/// Last-seen tracker for all stations
#[derive(Debug)]
pub struct StalenessDetector {
    config: StalenessConfig,
    stations: Mutex<HashMap<StationId, StationClock>>,
}

impl StalenessDetector {
    /// Create a new detector
    pub fn new(config: StalenessConfig) -> Self {
        info!(
            "Creating staleness detector: stale after {}s, missing after {}s",
            config.stale_after().num_seconds(),
            config.missing_after().num_seconds()
        );
        Self {
            config,
            stations: Mutex::new(HashMap::new()),
        }
    }

    /// Classify a data age. Thresholds are strictly greater-than.
    pub fn classify(&self, age: Duration) -> Freshness {
        if age > self.config.missing_after() {
            Freshness::Missing
        } else if age > self.config.stale_after() {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Record that a station delivered data at `seen_at`.
    ///
    /// Last-seen never moves backwards, so late replays cannot make a
    /// station look older than it is.
    pub fn observe(&self, station: &StationId, seen_at: DateTime<Utc>) {
        let mut stations = self.lock();
        match stations.get_mut(station) {
            Some(clock) => {
                if seen_at > clock.last_seen {
                    clock.last_seen = seen_at;
                }
                if clock.reported == Freshness::Missing {
                    info!("Station {} reporting again after outage", station);
                }
                clock.reported = Freshness::Fresh;
            }
            None => {
                debug!("First data from station {}", station);
                stations.insert(
                    station.clone(),
                    StationClock {
                        last_seen: seen_at,
                        reported: Freshness::Fresh,
                    },
                );
            }
        }
    }

    /// Freshness of a station at `now`. Unknown stations are missing.
    pub fn check(&self, station: &StationId, now: DateTime<Utc>) -> Freshness {
        let mut stations = self.lock();
        match stations.get_mut(station) {
            Some(clock) => self.reclassify(station, clock, now),
            None => Freshness::Missing,
        }
    }

    /// Re-evaluate every known station, announcing transitions.
    ///
    /// Returns the stations currently missing.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<StationId> {
        let mut stations = self.lock();
        let mut missing = Vec::new();
        for (station, clock) in stations.iter_mut() {
            if self.reclassify(station, clock, now) == Freshness::Missing {
                missing.push(station.clone());
            }
        }
        missing.sort();
        missing
    }

    /// Last time a station was seen
    pub fn last_seen(&self, station: &StationId) -> Option<DateTime<Utc>> {
        self.lock().get(station).map(|clock| clock.last_seen)
    }

    /// Number of stations ever observed
    pub fn station_count(&self) -> usize {
        self.lock().len()
    }

    fn reclassify(
        &self,
        station: &StationId,
        clock: &mut StationClock,
        now: DateTime<Utc>,
    ) -> Freshness {
        let age = (now - clock.last_seen).max(Duration::zero());
        let freshness = self.classify(age);
        if freshness != clock.reported {
            match freshness {
                Freshness::Missing => {
                    // Advisory only: operators must tell a dead sensor from clean air.
                    warn!(
                        "Station {} missing: no data for {} min (last seen {})",
                        station,
                        age.num_minutes(),
                        clock.last_seen
                    );
                    metrics::counter!("aq_station_missing_total").increment(1);
                }
                Freshness::Stale => {
                    debug!("Station {} stale: no data for {} min", station, age.num_minutes());
                }
                Freshness::Fresh => {}
            }
            clock.reported = freshness;
        }
        freshness
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StationId, StationClock>> {
        // Entries are plain timestamps, valid even after a panicking writer.
        self.stations.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StalenessDetector {
    fn default() -> Self {
        Self::new(StalenessConfig::default())
    }
}
