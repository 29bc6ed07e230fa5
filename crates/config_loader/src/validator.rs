//! Configuration validation.
//!
//! Rules:
//! - broker.host non-empty
//! - namespace and stream ids are topic-grammar safe (ASCII, no wildcards)
//! - stream ids unique, resolved topics unique
//! - queue_budget > 0, ack_timeout > 0
//! - backoff_initial <= backoff_max, jitter within [0, 1)

use std::collections::HashSet;

use contracts::{RelayBlueprint, RelayError};

/// Validate a RelayBlueprint
///
/// Returns the first error found, or Ok(()).
pub fn validate(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    validate_broker(blueprint)?;
    validate_streams(blueprint)?;
    validate_reliability(blueprint)?;
    validate_clock_sync(blueprint)?;
    Ok(())
}

/// Characters the broker topic grammar cannot accept inside a topic segment.
const TOPIC_FORBIDDEN: &[char] = &['+', '#', '\0'];

fn topic_grammar_ok(s: &str) -> bool {
    !s.is_empty()
        && s.is_ascii()
        && !s.contains(TOPIC_FORBIDDEN)
        && !s.chars().any(|c| c.is_ascii_whitespace())
}

fn validate_broker(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let broker = &blueprint.broker;

    if broker.host.trim().is_empty() {
        return Err(RelayError::config_validation(
            "broker.host",
            "broker host must not be empty",
        ));
    }

    if !topic_grammar_ok(&broker.namespace) {
        return Err(RelayError::config_validation(
            "broker.namespace",
            format!(
                "namespace '{}' must be non-empty ASCII without wildcards or whitespace",
                broker.namespace
            ),
        ));
    }

    if broker.keepalive_secs == 0 {
        return Err(RelayError::config_validation(
            "broker.keepalive_secs",
            "keepalive must be > 0",
        ));
    }

    // Credentials come as a pair or not at all
    if broker.username.is_some() != broker.password.is_some() {
        return Err(RelayError::config_validation(
            "broker.username / broker.password",
            "username and password must be set together",
        ));
    }

    Ok(())
}

fn validate_streams(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let mut seen_ids = HashSet::new();
    let mut seen_topics = HashSet::new();

    for stream in &blueprint.streams {
        if !topic_grammar_ok(stream.id.as_str()) || stream.id.contains('/') {
            return Err(RelayError::config_validation(
                format!("streams[id={}]", stream.id),
                "stream id must be non-empty ASCII without '/', wildcards or whitespace",
            ));
        }

        if !seen_ids.insert(stream.id.clone()) {
            return Err(RelayError::config_validation(
                format!("streams[id={}]", stream.id),
                "duplicate stream id",
            ));
        }

        let topic = match &stream.topic {
            Some(t) => {
                if !topic_grammar_ok(t) {
                    return Err(RelayError::config_validation(
                        format!("streams[id={}].topic", stream.id),
                        format!("topic override '{t}' violates the topic grammar"),
                    ));
                }
                t.clone()
            }
            None => format!("{}/{}", blueprint.broker.namespace, stream.id),
        };

        if !seen_topics.insert(topic.clone()) {
            return Err(RelayError::config_validation(
                format!("streams[id={}].topic", stream.id),
                format!("topic '{topic}' resolves for more than one stream"),
            ));
        }
    }

    Ok(())
}

fn validate_reliability(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let r = &blueprint.reliability;

    if r.queue_budget == 0 {
        return Err(RelayError::config_validation(
            "reliability.queue_budget",
            "queue budget must be > 0",
        ));
    }

    if r.ack_timeout_ms == 0 {
        return Err(RelayError::config_validation(
            "reliability.ack_timeout_ms",
            "ack timeout must be > 0",
        ));
    }

    if r.backoff_initial_ms == 0 || r.backoff_initial_ms > r.backoff_max_ms {
        return Err(RelayError::config_validation(
            "reliability.backoff_initial_ms / reliability.backoff_max_ms",
            format!(
                "backoff bounds invalid: initial {}ms, max {}ms",
                r.backoff_initial_ms, r.backoff_max_ms
            ),
        ));
    }

    if !(0.0..1.0).contains(&r.backoff_jitter) {
        return Err(RelayError::config_validation(
            "reliability.backoff_jitter",
            format!("jitter must be within [0, 1), got {}", r.backoff_jitter),
        ));
    }

    Ok(())
}

fn validate_clock_sync(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    if blueprint.clock_sync.refresh_interval_secs == 0 {
        return Err(RelayError::config_validation(
            "clock_sync.refresh_interval_secs",
            "refresh interval must be > 0",
        ));
    }
    Ok(())
}
