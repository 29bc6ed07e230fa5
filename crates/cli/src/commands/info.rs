//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::InfoArgs;

#[derive(Serialize)]
struct InfoOutput {
    config_path: String,
    version: String,
    broker: BrokerInfo,
    reliability: ReliabilityInfo,
    clock_sync_refresh_secs: u64,
    streams: Vec<StreamInfo>,
}

#[derive(Serialize)]
struct BrokerInfo {
    host: String,
    port: u16,
    tls: bool,
    keepalive_secs: u64,
    namespace: String,
    guarantee: String,
    authenticated: bool,
}

#[derive(Serialize)]
struct ReliabilityInfo {
    queue_budget: usize,
    ack_timeout_ms: u64,
    max_retries: u32,
    max_connect_failures: u32,
    backoff_initial_ms: u64,
    backoff_max_ms: u64,
    backoff_jitter: f64,
}

#[derive(Serialize)]
struct StreamInfo {
    id: String,
    priority: u8,
    topic: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let output = InfoOutput {
        config_path: args.config.display().to_string(),
        version: format!("{:?}", blueprint.version),
        broker: BrokerInfo {
            host: blueprint.broker.host.clone(),
            port: blueprint.broker.port,
            tls: blueprint.broker.tls,
            keepalive_secs: blueprint.broker.keepalive_secs,
            namespace: blueprint.broker.namespace.clone(),
            guarantee: format!("{:?}", blueprint.broker.guarantee),
            authenticated: blueprint.broker.username.is_some(),
        },
        reliability: ReliabilityInfo {
            queue_budget: blueprint.reliability.queue_budget,
            ack_timeout_ms: blueprint.reliability.ack_timeout_ms,
            max_retries: blueprint.reliability.max_retries,
            max_connect_failures: blueprint.reliability.max_connect_failures,
            backoff_initial_ms: blueprint.reliability.backoff_initial_ms,
            backoff_max_ms: blueprint.reliability.backoff_max_ms,
            backoff_jitter: blueprint.reliability.backoff_jitter,
        },
        clock_sync_refresh_secs: blueprint.clock_sync.refresh_interval_secs,
        streams: blueprint
            .streams
            .iter()
            .map(|stream| StreamInfo {
                id: stream.id.to_string(),
                priority: stream.priority,
                topic: relay::resolve_topic(&blueprint.broker.namespace, stream),
            })
            .collect(),
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize info output")?
        );
    } else {
        print_info(&output, args.topics);
    }

    Ok(())
}

fn print_info(info: &InfoOutput, topics: bool) {
    println!("Configuration: {}", info.config_path);
    println!("Version: {}", info.version);

    println!("\nBroker:");
    println!(
        "  {}:{} (tls: {}, keepalive: {}s)",
        info.broker.host, info.broker.port, info.broker.tls, info.broker.keepalive_secs
    );
    println!("  Namespace: {}", info.broker.namespace);
    println!("  Guarantee: {}", info.broker.guarantee);
    println!("  Authenticated: {}", info.broker.authenticated);

    println!("\nReliability:");
    println!("  Queue budget: {}", info.reliability.queue_budget);
    println!(
        "  Ack timeout: {}ms, max retries: {}",
        info.reliability.ack_timeout_ms, info.reliability.max_retries
    );
    println!(
        "  Backoff: {}ms .. {}ms (jitter {:.0}%), connect budget: {}",
        info.reliability.backoff_initial_ms,
        info.reliability.backoff_max_ms,
        info.reliability.backoff_jitter * 100.0,
        info.reliability.max_connect_failures
    );

    println!(
        "\nClock sync refresh: {}s",
        info.clock_sync_refresh_secs
    );

    println!("\nStreams ({}):", info.streams.len());
    for stream in &info.streams {
        if topics {
            println!(
                "  - {} (priority {}) -> {}",
                stream.id, stream.priority, stream.topic
            );
        } else {
            println!("  - {} (priority {})", stream.id, stream.priority);
        }
    }
}
