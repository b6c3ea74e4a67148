//! Transboundary Air-Quality Coordinator
//!
//! Wires the pipeline stages into a running service:
//! readings -> per-station lanes (normalize, freshness, hysteresis)
//! -> cross-border reconciliation -> idempotent delivery.

mod coordinator;
mod error;
mod lane;
mod notifiers;
mod settings;
mod telemetry;

pub use coordinator::{Collaborators, Coordinator};
pub use error::{ConfigError, IngestError};
pub use lane::StationLane;
pub use notifiers::{LogNotifier, MqttNotifier};
pub use settings::{
    LoggingSettings, MetricsSettings, MqttSettings, NotifierSettings, RuntimeSettings, Settings,
    TransportSettings, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};
pub use telemetry::{init_logging, init_metrics};
