//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    broker: String,
    namespace: String,
    guarantee: String,
    stream_count: usize,
    queue_budget: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    broker: format!("{}:{}", blueprint.broker.host, blueprint.broker.port),
                    namespace: blueprint.broker.namespace.clone(),
                    guarantee: format!("{:?}", blueprint.broker.guarantee),
                    stream_count: blueprint.streams.len(),
                    queue_budget: blueprint.reliability.queue_budget,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &contracts::RelayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.streams.is_empty() {
        warnings.push("No streams configured - the relay will publish nothing".to_string());
    }

    if blueprint.broker.username.is_some() && !blueprint.broker.tls {
        warnings.push("Credentials configured without TLS - they travel in cleartext".to_string());
    }

    if blueprint.reliability.queue_budget < blueprint.streams.len() {
        warnings.push(format!(
            "Queue budget ({}) is smaller than the stream count ({})",
            blueprint.reliability.queue_budget,
            blueprint.streams.len()
        ));
    }

    if blueprint.broker.keepalive_secs < 10 {
        warnings.push(format!(
            "Keepalive of {}s is aggressive for WAN links",
            blueprint.broker.keepalive_secs
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Broker: {}", summary.broker);
            println!("  Namespace: {}", summary.namespace);
            println!("  Guarantee: {}", summary.guarantee);
            println!("  Streams: {}", summary.stream_count);
            println!("  Queue budget: {}", summary.queue_budget);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
