//! Mock Relay Example
//!
//! Demonstrates the full relay path against the in-process broker: synthetic
//! sample sources feed per-stream workers, the reliability controller
//! publishes to a MockBroker, and the demo decodes what arrived.
//!
//! Run with: cargo run -p mock_relay

use std::sync::Arc;

use config_loader::ConfigLoader;
use contracts::{
    BrokerCredentials, ClockSyncRecord, DecimalTimestamp, QosLevel, RelayBlueprint,
};
use formatter::MessageFormatter;
use relay::{MockSampleSource, RelayCore};
use reliability::ReliabilityController;
use timebase::ClockSyncRegistry;
use transport::MockBroker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Mock Relay Demo");

    // ==== Stage 1: Use default config or load from file ====
    let blueprint = if let Some(path) = std::env::args().nth(1) {
        tracing::info!(path = %path, "Loading blueprint config");
        ConfigLoader::load_from_path(std::path::Path::new(&path))?
    } else {
        create_test_blueprint()?
    };

    // ==== Stage 2: Start the reliability controller (mock broker) ====
    tracing::info!("Creating mock broker session...");
    let broker = MockBroker::new();
    let (controller, handle) = ReliabilityController::new(
        broker.clone(),
        BrokerCredentials {
            client_id: "mock-relay-demo".to_string(),
            username: None,
            password: None,
        },
        QosLevel::AtLeastOnce,
        blueprint.reliability.clone(),
    );
    let controller_task = tokio::spawn(controller.run());

    // ==== Stage 3: Seed clock-sync records ====
    let registry = Arc::new(ClockSyncRegistry::new());
    for stream in &blueprint.streams {
        registry.update(
            stream.id.clone(),
            ClockSyncRecord {
                offset: DecimalTimestamp::from_nanos(1_500),
                uncertainty: DecimalTimestamp::from_nanos(100),
                measured_at: DecimalTimestamp::now_utc(),
            },
        );
    }

    // ==== Stage 4: Attach synthetic feeds and run ====
    let mut core = RelayCore::new(handle.clone(), registry, &blueprint.broker.namespace);
    for stream in &blueprint.streams {
        let source = if stream.id.as_str().contains("Marker") {
            MockSampleSource::markers(stream.id.as_str(), 50.0).with_limit(20)
        } else {
            MockSampleSource::channels(stream.id.as_str(), 200.0, 8).with_limit(100)
        };
        core.attach(stream, source).await?;
    }
    tracing::info!(streams = core.worker_count(), "Relay running");

    for (stream_id, result) in core.join_all().await {
        match result {
            Ok(()) => tracing::info!(stream = %stream_id, "feed finished"),
            Err(e) => tracing::warn!(stream = %stream_id, error = %e, "feed failed"),
        }
    }

    handle.shutdown().await?;
    controller_task.await??;

    // ==== Stage 5: Inspect what reached the broker ====
    let published = broker.published();
    tracing::info!(messages = published.len(), "Broker received all traffic");

    let decoder = MessageFormatter::new();
    if let Some(first) = published.first() {
        let wire = decoder.decode(&first.payload)?;
        tracing::info!(
            stream = %wire.stream_id,
            sequence = wire.sequence_number,
            source_timestamp = %wire.source_timestamp,
            "First message on the wire"
        );
    }

    tracing::info!("Mock Relay Demo complete");
    Ok(())
}

fn create_test_blueprint() -> Result<RelayBlueprint, Box<dyn std::error::Error>> {
    let toml = r#"
        [broker]
        host = "localhost"
        namespace = "lsl"

        [[streams]]
        id = "EEG_demo"
        priority = 0

        [[streams]]
        id = "Marker_demo"
        priority = 2

        [reliability]
        ack_timeout_ms = 1000
        shutdown_grace_ms = 2000
    "#;
    Ok(ConfigLoader::load_from_str(
        toml,
        config_loader::ConfigFormat::Toml,
    )?)
}
