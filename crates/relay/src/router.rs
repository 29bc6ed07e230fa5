//! Topic routing.

use contracts::StreamConfig;

/// Resolve the broker topic for a stream: the configured per-stream override
/// when present, otherwise `{namespace}/{stream_id}`.
///
/// The config validator has already enforced the topic grammar (ASCII, no
/// wildcards, no whitespace), so resolution here is pure string assembly.
pub fn resolve_topic(namespace: &str, stream: &StreamConfig) -> String {
    match &stream.topic {
        Some(topic) => topic.clone(),
        None => format!("{namespace}/{}", stream.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: &str, topic: Option<&str>) -> StreamConfig {
        StreamConfig {
            id: id.into(),
            priority: 0,
            topic: topic.map(str::to_string),
        }
    }

    #[test]
    fn test_default_rule() {
        assert_eq!(resolve_topic("lsl", &stream("EEG_1", None)), "lsl/EEG_1");
    }

    #[test]
    fn test_override_wins() {
        assert_eq!(
            resolve_topic("lsl", &stream("EEG_1", Some("lab/raw/eeg"))),
            "lab/raw/eeg"
        );
    }
}
