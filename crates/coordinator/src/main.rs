//! Transboundary AQ Coordinator - Main Entry Point
//!
//! Reads newline-delimited JSON readings from stdin.

use aq_core::{RawReading, SystemClock};
use coordinator::{
    init_logging, init_metrics, Collaborators, Coordinator, LogNotifier, MqttNotifier,
    NotifierSettings, Settings,
};
use delivery::{ChannelFailureQueue, Notifier};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;
    init_metrics(&settings.metrics)?;

    info!("=== Transboundary AQ Coordinator v{} ===", env!("CARGO_PKG_VERSION"));

    let notifier: Arc<dyn Notifier> = match &settings.notifier {
        NotifierSettings::Log => Arc::new(LogNotifier),
        NotifierSettings::Mqtt(mqtt) => Arc::new(MqttNotifier::connect(mqtt)),
    };

    let (failures, mut failed_rx) = ChannelFailureQueue::new(settings.runtime.failure_queue_capacity);
    let operator_queue = tokio::spawn(async move {
        while let Some(failed) = failed_rx.recv().await {
            error!(
                "Operator attention: event {} for pair {} undelivered after {} attempt(s): {}",
                failed.event.event_id,
                failed.event.pair_id,
                failed.record.dispatch_attempts,
                failed.reason
            );
        }
    });

    let coordinator = Coordinator::start(
        &settings,
        Collaborators {
            clock: Arc::new(SystemClock),
            transport: settings.transport.build(),
            notifier,
            failures: Arc::new(failures),
        },
    )?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received, shutting down");
                coordinator.trigger_shutdown();
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => ingest_line(&coordinator, &line),
                Ok(None) => {
                    info!("End of input, draining");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
        }
    }

    coordinator.shutdown().await;
    if let Err(e) = operator_queue.await {
        warn!("Failure queue consumer ended abnormally: {}", e);
    }
    Ok(())
}

fn ingest_line(coordinator: &Coordinator, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let raw: RawReading = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping malformed input line: {}", e);
            metrics::counter!("aq_readings_rejected_total", "reason" => "malformed").increment(1);
            return;
        }
    };

    if let Err(e) = coordinator.submit(raw) {
        warn!("Reading not accepted: {}", e);
    }
}
