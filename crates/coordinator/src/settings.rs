//! Layered service configuration
//!
//! A TOML file (optional) overlaid by `AQ__SECTION__KEY` environment
//! variables. Durations are integer seconds.

use crate::error::ConfigError;
use alerting::AlertConfig;
use aq_core::{CountryCode, StationId};
use delivery::DeliveryConfig;
use lanes::LaneConfig;
use reading_normalizer::NormalizerConfig;
use reconciler::{
    FixedTransportModel, ReconcilerConfig, StationPair, TransportModel, WindTransportModel,
};
use serde::{Deserialize, Serialize};
use staleness::StalenessConfig;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "AQ_CONFIG";

/// Configuration file used when `AQ_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/coordinator.toml";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub metrics: MetricsSettings,
    pub normalizer: NormalizerConfig,
    pub staleness: StalenessConfig,
    pub alerting: AlertConfig,
    pub reconciler: ReconcilerConfig,
    pub delivery: DeliveryConfig,
    pub lanes: LaneConfig,
    pub transport: TransportSettings,
    pub notifier: NotifierSettings,
    pub runtime: RuntimeSettings,
    /// Monitored cross-border corridors
    pub pairs: Vec<StationPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Prometheus scrape address, e.g. `0.0.0.0:9000`; disabled when unset
    pub listen: Option<String>,
}

/// Which transport model feeds the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum TransportSettings {
    Wind(WindTransportModel),
    Fixed(FixedTransportModel),
}

impl Default for TransportSettings {
    fn default() -> Self {
        // Dry-season westerlies over the Ganges delta
        TransportSettings::Wind(WindTransportModel {
            wind_from_deg: 270.0,
            wind_speed_ms: 3.0,
            contribution: 0.3,
        })
    }
}

impl TransportSettings {
    pub fn build(&self) -> Arc<dyn TransportModel> {
        match self {
            TransportSettings::Wind(model) => Arc::new(model.clone()),
            TransportSettings::Fixed(model) => Arc::new(model.clone()),
        }
    }

    /// Travel time the model would answer for a pair, in seconds
    pub fn travel_seconds(&self, pair: &StationPair) -> Option<f64> {
        match self {
            TransportSettings::Wind(model) if model.wind_speed_ms > 0.0 => {
                Some(pair.distance_km * 1000.0 / model.wind_speed_ms)
            }
            TransportSettings::Wind(_) => None,
            TransportSettings::Fixed(model) => Some(model.travel_time_seconds as f64),
        }
    }
}

/// Downstream notifier selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierSettings {
    #[default]
    Log,
    Mqtt(MqttSettings),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Events go to `<topic_prefix>/<pair id>/events`
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "aq-coordinator".to_string(),
            topic_prefix: "aq".to_string(),
            keep_alive_secs: 30,
        }
    }
}

/// Scheduling knobs of the running service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Period of the staleness sweep, record eviction and full reconcile
    pub tick_secs: u64,
    /// Pending station-change notifications before extras are dropped
    pub change_buffer: usize,
    pub failure_queue_capacity: usize,
    /// How long in-flight dispatches may finish after shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            change_buffer: 1024,
            failure_queue_capacity: 256,
            shutdown_grace_secs: 15,
        }
    }
}

impl RuntimeSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Settings {
    /// Load from `AQ_CONFIG` (or the default path) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file; a missing file means defaults
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("AQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.alerting.thresholds.validate()?;

        if !(0.0..=1.0).contains(&self.reconciler.suspect_weight) {
            return Err(ConfigError::InvalidSetting {
                field: "reconciler.suspect_weight",
                reason: format!("{} is outside 0..=1", self.reconciler.suspect_weight),
            });
        }
        if self.delivery.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "delivery.retry.max_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }

        let mut ids = HashSet::new();
        for pair in &self.pairs {
            let invalid = |reason: &str| ConfigError::InvalidPair {
                id: pair.id.clone(),
                reason: reason.to_string(),
            };
            if pair.id.trim().is_empty() {
                return Err(invalid("empty id"));
            }
            if !ids.insert(pair.id.as_str()) {
                return Err(invalid("duplicate id"));
            }
            if pair.station_a == pair.station_b {
                return Err(invalid("both sides are the same station"));
            }
            if !pair.distance_km.is_finite() || pair.distance_km <= 0.0 {
                return Err(invalid("distance must be positive"));
            }
            if !pair.bearing_a_to_b_deg.is_finite() {
                return Err(invalid("bearing must be finite"));
            }

            // The departure sample must still be in the upwind history
            if let Some(travel) = self.transport.travel_seconds(pair) {
                let oldest_needed =
                    travel - self.reconciler.transport_tolerance_seconds as f64;
                if oldest_needed > self.alerting.history_seconds as f64 {
                    return Err(ConfigError::InvalidSetting {
                        field: "alerting.history_seconds",
                        reason: format!(
                            "pair {} needs {:.0}s of upwind history, {}s kept",
                            pair.id, oldest_needed, self.alerting.history_seconds
                        ),
                    });
                }
            }
        }

        self.station_registry().map(|_| ())
    }

    /// Country of every paired station
    pub fn station_registry(&self) -> Result<BTreeMap<StationId, CountryCode>, ConfigError> {
        let mut registry: BTreeMap<StationId, CountryCode> = BTreeMap::new();
        for pair in &self.pairs {
            for (station, country) in [
                (&pair.station_a, &pair.country_a),
                (&pair.station_b, &pair.country_b),
            ] {
                match registry.get(station) {
                    Some(existing) if existing != country => {
                        return Err(ConfigError::ConflictingCountry {
                            station: station.clone(),
                            first: existing.clone(),
                            second: country.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        registry.insert(station.clone(), country.clone());
                    }
                }
            }
        }
        Ok(registry)
    }
}
