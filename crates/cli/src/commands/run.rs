//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding broker host from CLI");
        blueprint.broker.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port, "Overriding broker port from CLI");
        blueprint.broker.port = port;
    }

    info!(
        broker = %format!("{}:{}", blueprint.broker.host, blueprint.broker.port),
        namespace = %blueprint.broker.namespace,
        streams = blueprint.streams.len(),
        guarantee = ?blueprint.broker.guarantee,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        duration: if args.duration == 0 {
            None
        } else {
            Some(Duration::from_secs(args.duration))
        },
        max_samples: if args.max_samples == 0 {
            None
        } else {
            Some(args.max_samples)
        },
        feed_rate_hz: args.feed_rate,
        mock_broker: args.mock_broker,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting relay pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run()
        .await
        .context("Relay pipeline failed")?;

    stats.print_summary();
    info!("LSL Relay finished");
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::RelayBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Broker:");
    println!(
        "  Address: {}:{} (tls: {})",
        blueprint.broker.host, blueprint.broker.port, blueprint.broker.tls
    );
    println!("  Namespace: {}", blueprint.broker.namespace);
    println!("  Guarantee: {:?}", blueprint.broker.guarantee);

    println!("\nStreams ({}):", blueprint.streams.len());
    for stream in &blueprint.streams {
        let topic = relay::resolve_topic(&blueprint.broker.namespace, stream);
        println!(
            "  - {} (priority {}) -> {}",
            stream.id, stream.priority, topic
        );
    }

    println!("\nReliability:");
    println!("  Queue budget: {}", blueprint.reliability.queue_budget);
    println!("  Ack timeout: {}ms", blueprint.reliability.ack_timeout_ms);
    println!("  Max retries: {}", blueprint.reliability.max_retries);
    println!(
        "  Backoff: {}ms .. {}ms (jitter {:.0}%)",
        blueprint.reliability.backoff_initial_ms,
        blueprint.reliability.backoff_max_ms,
        blueprint.reliability.backoff_jitter * 100.0
    );
    println!();
}
