//! End-to-end coordination scenarios

use aq_core::{
    AlertLevel, Attribution, CoordinationEvent, CountryCode, ManualClock, RawReading, Side,
    StationId, StationSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use coordinator::{Collaborators, Coordinator, IngestError, RuntimeSettings, Settings, TransportSettings};
use delivery::{ChannelFailureQueue, DeliveryFailure, FailedDelivery, NotifyError, Notifier};
use lanes::LaneError;
use reconciler::{FixedTransportModel, StationPair, WindTransportModel};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// 2024-11-02 04:00 UTC, the start of a four-hour window bucket
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 2, 4, 0, 0).unwrap()
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<CoordinationEvent>>,
    reject: bool,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<CoordinationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &CoordinationEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        if self.reject {
            return Err(NotifyError::Permanent("recipient unknown".to_string()));
        }
        Ok(())
    }
}

struct Harness {
    coordinator: Coordinator,
    notifier: Arc<RecordingNotifier>,
    failed: mpsc::Receiver<FailedDelivery>,
}

fn settings() -> Settings {
    Settings {
        transport: TransportSettings::Fixed(FixedTransportModel {
            upwind: Side::A,
            travel_time_seconds: 2 * 3600,
            contribution: 0.4,
        }),
        runtime: RuntimeSettings {
            tick_secs: 3600,
            ..Default::default()
        },
        pairs: vec![StationPair {
            id: "dhaka-kolkata".to_string(),
            station_a: station("DHK-001"),
            country_a: CountryCode::new("BD").unwrap(),
            station_b: station("KOL-007"),
            country_b: CountryCode::new("IN").unwrap(),
            bearing_a_to_b_deg: 250.0,
            distance_km: 36.0,
        }],
        ..Default::default()
    }
}

fn start(now: DateTime<Utc>, notifier: RecordingNotifier) -> Harness {
    start_with(&settings(), Arc::new(ManualClock::new(now)), notifier)
}

fn start_with(settings: &Settings, clock: Arc<ManualClock>, notifier: RecordingNotifier) -> Harness {
    let notifier = Arc::new(notifier);
    let (failures, failed) = ChannelFailureQueue::new(8);
    let coordinator = Coordinator::start(
        settings,
        Collaborators {
            clock,
            transport: settings.transport.build(),
            notifier: notifier.clone(),
            failures: Arc::new(failures),
        },
    )
    .unwrap();
    Harness {
        coordinator,
        notifier,
        failed,
    }
}

fn station(id: &str) -> StationId {
    StationId::new(id).unwrap()
}

fn reading(station_id: &str, country: &str, value: f64, at: DateTime<Utc>) -> RawReading {
    measured(station_id, country, "pm25", value, at)
}

fn measured(
    station_id: &str,
    country: &str,
    pollutant: &str,
    value: f64,
    at: DateTime<Utc>,
) -> RawReading {
    RawReading {
        station_id: station_id.to_string(),
        country_code: country.to_string(),
        pollutant: pollutant.to_string(),
        value: Some(value),
        unit: "ug/m3".to_string(),
        observed_at: at.to_rfc3339(),
        received_at: None,
    }
}

/// Alternating half-hourly reports over two hours: Dhaka Red, Kolkata Green
fn two_hour_feed() -> Vec<RawReading> {
    (0..=4)
        .flat_map(|i| {
            let at = t0() + Duration::minutes(30 * i);
            [
                reading("DHK-001", "BD", 287.0, at),
                reading("KOL-007", "IN", 45.0 + i as f64, at),
            ]
        })
        .collect()
}

/// Feed every station one reading per half hour, advancing the clock with
/// the feed, and wait for each step to be applied before the next
async fn half_hourly_feed(
    h: &Harness,
    clock: &ManualClock,
    stations: &[(&str, &str, f64)],
    steps: i64,
) {
    for step in 0..=steps {
        let at = t0() + Duration::minutes(30 * step);
        clock.set(at);
        for (id, country, value) in stations {
            h.coordinator.submit(reading(id, country, *value, at)).unwrap();
        }
        for (id, _, _) in stations {
            wait_for_sequence(&h.coordinator, id, step as u64 + 1).await;
        }
    }
}

async fn wait_for_sequence(coordinator: &Coordinator, id: &str, sequence: u64) -> StationSnapshot {
    let id = station(id);
    for _ in 0..500 {
        if let Some(snapshot) = coordinator.snapshot(&id) {
            if snapshot.sequence >= sequence {
                return snapshot;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("station {} never reached sequence {}", id, sequence);
}

#[tokio::test]
async fn test_red_upwind_green_downwind_yields_one_event() {
    let h = start(t0(), RecordingNotifier::default());

    h.coordinator.submit(reading("DHK-001", "BD", 287.0, t0())).unwrap();
    h.coordinator.submit(reading("KOL-007", "IN", 45.0, t0())).unwrap();
    h.coordinator.shutdown().await;

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.severity, AlertLevel::Red);
    assert_eq!(event.levels, (AlertLevel::Red, AlertLevel::Green));
    assert_eq!(
        event.country_pair,
        (CountryCode::new("BD").unwrap(), CountryCode::new("IN").unwrap())
    );
    assert_eq!(
        event.attribution,
        Attribution::Upwind(CountryCode::new("BD").unwrap())
    );
    assert!(event.recommended_actions.contains_key(&CountryCode::new("BD").unwrap()));
    assert!(event.recommended_actions.contains_key(&CountryCode::new("IN").unwrap()));
}

#[tokio::test]
async fn test_transport_window_pairing_dispatches_once() {
    let h = start(t0() + Duration::hours(2), RecordingNotifier::default());

    for raw in two_hour_feed() {
        h.coordinator.submit(raw).unwrap();
    }
    h.coordinator.shutdown().await;

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, AlertLevel::Red);
    assert_eq!(events[0].window_start, t0());
}

#[tokio::test]
async fn test_replayed_feed_is_idempotent() {
    let h = start(t0() + Duration::hours(2), RecordingNotifier::default());
    let feed = two_hour_feed();

    for raw in feed.clone() {
        h.coordinator.submit(raw).unwrap();
    }
    let dhaka = wait_for_sequence(&h.coordinator, "DHK-001", 5).await;
    let kolkata = wait_for_sequence(&h.coordinator, "KOL-007", 5).await;

    for raw in feed {
        h.coordinator.submit(raw).unwrap();
    }
    // A newer reading flushes the replays through the lane
    let later = t0() + Duration::minutes(123);
    h.coordinator
        .submit(reading("KOL-007", "IN", 50.0, later))
        .unwrap();
    wait_for_sequence(&h.coordinator, "KOL-007", 6).await;

    assert_eq!(h.coordinator.snapshot(&station("DHK-001")), Some(dhaka));
    let kolkata_after = h.coordinator.snapshot(&station("KOL-007")).unwrap();
    assert_eq!(kolkata_after.level, kolkata.level);
    assert_eq!(kolkata_after.sequence, kolkata.sequence + 1);

    h.coordinator.shutdown().await;
    assert_eq!(h.notifier.events().len(), 1);
}

#[tokio::test]
async fn test_missing_partner_yields_no_event() {
    let h = start(t0(), RecordingNotifier::default());

    h.coordinator.submit(reading("DHK-001", "BD", 287.0, t0())).unwrap();
    let snapshot = wait_for_sequence(&h.coordinator, "DHK-001", 1).await;
    assert_eq!(snapshot.level, AlertLevel::Red);
    assert_eq!(
        h.coordinator.freshness(&station("KOL-007")),
        staleness::Freshness::Missing
    );

    h.coordinator.shutdown().await;
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_invalid_reading_does_not_mutate_state() {
    let h = start(t0(), RecordingNotifier::default());

    h.coordinator.submit(reading("DHK-001", "BD", -5.0, t0())).unwrap();
    h.coordinator
        .submit(reading("DHK-001", "BD", 20.0, t0() + Duration::minutes(1)))
        .unwrap();
    let snapshot = wait_for_sequence(&h.coordinator, "DHK-001", 1).await;

    assert_eq!(snapshot.sequence, 1);
    assert_eq!(snapshot.level, AlertLevel::Green);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_unpaired_station_is_refused() {
    let h = start(t0(), RecordingNotifier::default());

    let err = h
        .coordinator
        .submit(reading("CTG-009", "BD", 80.0, t0()))
        .unwrap_err();
    assert_eq!(
        err,
        IngestError::Lane(LaneError::UnknownStation(station("CTG-009")))
    );
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_rejected_delivery_reaches_failure_queue() {
    let mut h = start(
        t0(),
        RecordingNotifier {
            reject: true,
            ..Default::default()
        },
    );

    h.coordinator.submit(reading("DHK-001", "BD", 287.0, t0())).unwrap();
    h.coordinator.submit(reading("KOL-007", "IN", 45.0, t0())).unwrap();
    h.coordinator.shutdown().await;

    let failed = h.failed.recv().await.unwrap();
    assert_eq!(
        failed.reason,
        DeliveryFailure::Rejected("recipient unknown".to_string())
    );
    assert_eq!(failed.record.dispatch_attempts, 1);
    assert_eq!(h.notifier.events().len(), 1);
}

#[tokio::test]
async fn test_triggered_shutdown_refuses_new_readings() {
    let h = start(t0(), RecordingNotifier::default());

    h.coordinator.submit(reading("DHK-001", "BD", 287.0, t0())).unwrap();
    wait_for_sequence(&h.coordinator, "DHK-001", 1).await;

    h.coordinator.trigger_shutdown();
    assert_eq!(
        h.coordinator
            .submit(reading("KOL-007", "IN", 45.0, t0()))
            .unwrap_err(),
        IngestError::Lane(LaneError::ShuttingDown)
    );
    h.coordinator.shutdown().await;
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_wind_corridor_pairs_across_travel_time() {
    // 60 km at 3 m/s: 5h33m of travel against 2h of tolerance
    let settings = Settings {
        transport: TransportSettings::Wind(WindTransportModel {
            wind_from_deg: 270.0,
            wind_speed_ms: 3.0,
            contribution: 0.3,
        }),
        runtime: RuntimeSettings {
            tick_secs: 3600,
            ..Default::default()
        },
        pairs: vec![StationPair {
            id: "rajshahi-malda".to_string(),
            station_a: station("RAJ-002"),
            country_a: CountryCode::new("BD").unwrap(),
            station_b: station("MLD-003"),
            country_b: CountryCode::new("IN").unwrap(),
            bearing_a_to_b_deg: 285.0,
            distance_km: 60.0,
        }],
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(t0()));
    let h = start_with(&settings, clock.clone(), RecordingNotifier::default());

    // Westerly wind: Malda is upwind of Rajshahi
    half_hourly_feed(
        &h,
        &clock,
        &[("RAJ-002", "BD", 40.0), ("MLD-003", "IN", 287.0)],
        14,
    )
    .await;
    h.coordinator.shutdown().await;

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.levels, (AlertLevel::Green, AlertLevel::Red));
    assert_eq!(
        event.attribution,
        Attribution::Upwind(CountryCode::new("IN").unwrap())
    );
    assert_eq!(event.window_start, t0());
    assert_eq!(event.worse_side, Side::B);
    assert!((event.transboundary_estimate - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_shipped_corridors_pair_live_streams() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/coordinator.toml");
    let settings = Settings::load_from(path).unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let h = start_with(&settings, clock.clone(), RecordingNotifier::default());

    // 26 hours covers the 22.7 h Dhaka-Kolkata crossing
    half_hourly_feed(
        &h,
        &clock,
        &[
            ("DHK-001", "BD", 40.0),
            ("KOL-007", "IN", 287.0),
            ("RAJ-002", "BD", 40.0),
            ("MLD-003", "IN", 287.0),
        ],
        52,
    )
    .await;
    h.coordinator.shutdown().await;

    let events = h.notifier.events();
    for pair_id in ["dhaka-kolkata", "rajshahi-malda"] {
        assert!(
            events.iter().any(|event| event.pair_id == pair_id),
            "no event for {}",
            pair_id
        );
    }
    for event in &events {
        assert_eq!(event.levels, (AlertLevel::Green, AlertLevel::Red));
        assert_eq!(
            event.attribution,
            Attribution::Upwind(CountryCode::new("IN").unwrap())
        );
    }
    let ids: HashSet<_> = events.iter().map(|event| event.event_id).collect();
    assert_eq!(ids.len(), events.len());
}

#[tokio::test]
async fn test_two_pollutant_station_keeps_highest_level() {
    let h = start(t0() + Duration::minutes(20), RecordingNotifier::default());

    // Both pollutants reported with one timestamp, PM10 first
    h.coordinator
        .submit(measured("DHK-001", "BD", "pm10", 60.0, t0()))
        .unwrap();
    h.coordinator
        .submit(measured("DHK-001", "BD", "pm25", 287.0, t0()))
        .unwrap();
    h.coordinator.submit(reading("KOL-007", "IN", 45.0, t0())).unwrap();

    // PM10 alone would sit far below the PM2.5 Red exit bar for the whole dwell
    for minutes in [5, 10, 15, 20] {
        h.coordinator
            .submit(measured(
                "DHK-001",
                "BD",
                "pm10",
                200.0,
                t0() + Duration::minutes(minutes),
            ))
            .unwrap();
    }
    let dhaka = wait_for_sequence(&h.coordinator, "DHK-001", 6).await;
    assert_eq!(dhaka.level, AlertLevel::Red);
    assert_eq!(dhaka.pollutants.len(), 2);

    h.coordinator.shutdown().await;
    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].levels, (AlertLevel::Red, AlertLevel::Green));
    assert!((events[0].value_difference - 242.0).abs() < 1e-9);
}
