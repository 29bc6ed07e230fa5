//! # Integration Tests
//!
//! End-to-end tests over the in-process broker.
//!
//! Covers:
//! - Config-driven pipeline wiring and wire-format checks
//! - Ordering and redelivery across a broker link loss
//! - Queue policy under sustained disconnection

#[cfg(test)]
mod contract_tests {
    use contracts::DecimalTimestamp;

    #[test]
    fn test_timestamps_survive_the_wire_as_text() {
        let ts = DecimalTimestamp::from_parts(1_700_000_000, 123_456_789);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1700000000.123456789\"");

        let back: DecimalTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        BrokerCredentials, ClockSyncRecord, DecimalTimestamp, QosLevel, ReliabilityConfig,
    };
    use formatter::MessageFormatter;
    use relay::{MockSampleSource, RelayCore};
    use reliability::ReliabilityController;
    use timebase::ClockSyncRegistry;
    use transport::MockBroker;

    fn fast_config() -> ReliabilityConfig {
        ReliabilityConfig {
            queue_budget: 1000,
            ack_timeout_ms: 500,
            max_retries: 3,
            max_connect_failures: 1000,
            backoff_initial_ms: 5,
            backoff_max_ms: 20,
            backoff_jitter: 0.0,
            backpressure_window_ms: 60_000,
            shutdown_grace_ms: 2_000,
        }
    }

    /// Full path: config file -> blueprint -> workers -> controller ->
    /// broker, with one synced and one unsynced stream.
    #[tokio::test]
    async fn test_e2e_config_driven_pipeline() {
        let toml = r#"
            [broker]
            host = "broker.example.org"
            namespace = "lab"

            [[streams]]
            id = "EEG_1"
            priority = 0

            [[streams]]
            id = "Markers"
            priority = 2
            topic = "lab/events"
        "#;
        let blueprint = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.streams.len(), 2);

        let broker = MockBroker::new();
        let (controller, handle) = ReliabilityController::new(
            broker.clone(),
            BrokerCredentials::default(),
            blueprint.broker.guarantee.qos(),
            fast_config(),
        );
        let controller_task = tokio::spawn(controller.run());

        // Only EEG_1 has a clock sync record; Markers stays degraded
        let registry = Arc::new(ClockSyncRegistry::new());
        registry.update(
            "EEG_1".into(),
            ClockSyncRecord {
                offset: DecimalTimestamp::from_nanos(1_250),
                uncertainty: DecimalTimestamp::from_nanos(40),
                measured_at: DecimalTimestamp::now_utc(),
            },
        );

        let mut core = RelayCore::new(handle.clone(), registry, &blueprint.broker.namespace);
        core.attach(
            &blueprint.streams[0],
            MockSampleSource::channels("EEG_1", 500.0, 8).with_limit(10),
        )
        .await
        .unwrap();
        core.attach(
            &blueprint.streams[1],
            MockSampleSource::markers("Markers", 500.0).with_limit(4),
        )
        .await
        .unwrap();

        for (id, result) in core.join_all().await {
            result.unwrap_or_else(|e| panic!("worker {id} failed: {e}"));
        }
        handle.shutdown().await.unwrap();
        controller_task.await.unwrap().unwrap();

        let published = broker.published();
        let formatter = MessageFormatter::new();

        let eeg: Vec<_> = published
            .iter()
            .filter(|r| r.topic == "lab/EEG_1")
            .collect();
        let markers: Vec<_> = published
            .iter()
            .filter(|r| r.topic == "lab/events")
            .collect();
        assert_eq!(eeg.len(), 10);
        assert_eq!(markers.len(), 4, "topic override must be honored");

        // FIFO per stream: sequence numbers arrive in submit order
        let eeg_seqs: Vec<u64> = eeg
            .iter()
            .map(|r| formatter.decode(&r.payload).unwrap().sequence_number)
            .collect();
        assert_eq!(eeg_seqs, (1..=10).collect::<Vec<u64>>());

        let synced = formatter.decode(&eeg[0].payload).unwrap();
        assert_eq!(
            synced.clock_offset,
            Some(DecimalTimestamp::from_nanos(1_250))
        );

        // An unsynced stream still flows, with the offset marked unavailable
        let raw: serde_json::Value = serde_json::from_slice(&markers[0].payload).unwrap();
        assert_eq!(raw["clock_offset"], "unavailable");
    }

    /// Broker link drops mid-run; everything is redelivered in order once
    /// the session comes back.
    #[tokio::test]
    async fn test_ordering_preserved_across_link_loss() {
        let broker = MockBroker::new();
        let (controller, handle) = ReliabilityController::new(
            broker.clone(),
            BrokerCredentials::default(),
            QosLevel::AtLeastOnce,
            fast_config(),
        );
        let controller_task = tokio::spawn(controller.run());

        let registry = Arc::new(ClockSyncRegistry::new());
        let mut core = RelayCore::new(handle.clone(), registry, "lsl");
        core.attach(
            &contracts::StreamConfig {
                id: "EEG_1".into(),
                priority: 0,
                topic: None,
            },
            MockSampleSource::channels("EEG_1", 500.0, 4).with_limit(30),
        )
        .await
        .unwrap();

        // Let some samples through, kill the link, then restore it
        tokio::time::sleep(Duration::from_millis(15)).await;
        broker.go_down();
        tokio::time::sleep(Duration::from_millis(40)).await;
        broker.go_up();

        let done = tokio::time::timeout(Duration::from_secs(10), core.join_all())
            .await
            .expect("workers stalled after reconnect");
        for (id, result) in done {
            result.unwrap_or_else(|e| panic!("worker {id} failed: {e}"));
        }
        handle.shutdown().await.unwrap();
        controller_task.await.unwrap().unwrap();

        let formatter = MessageFormatter::new();
        let seqs: Vec<u64> = broker
            .published()
            .iter()
            .map(|r| formatter.decode(&r.payload).unwrap().sequence_number)
            .collect();

        // At-least-once allows redelivery, never reordering
        assert!(
            seqs.windows(2).all(|w| w[0] <= w[1]),
            "sequence went backwards: {seqs:?}"
        );

        let mut unique = seqs.clone();
        unique.dedup();
        assert_eq!(
            unique,
            (1..=30).collect::<Vec<u64>>(),
            "every sample must reach the broker, in order, with no gaps"
        );
    }
}

#[cfg(test)]
mod queue_policy_tests {
    use bytes::Bytes;
    use contracts::{
        BrokerCredentials, DecimalTimestamp, OutboundMessage, QosLevel, ReliabilityConfig,
    };
    use reliability::{ReliabilityController, SubmitOutcome};
    use transport::MockBroker;

    fn msg(stream: &str, seq: u64) -> OutboundMessage {
        OutboundMessage::new(
            stream.into(),
            format!("lsl/{stream}"),
            seq,
            Bytes::from_static(b"{}"),
            DecimalTimestamp::ZERO,
        )
    }

    /// With the broker unreachable the shared budget fills up; the policy
    /// protects high-priority data and sheds the rest.
    #[tokio::test]
    async fn test_queue_policy_under_sustained_disconnection() {
        let broker = MockBroker::new();
        broker.fail_connects(u32::MAX);

        let config = ReliabilityConfig {
            queue_budget: 3,
            ack_timeout_ms: 500,
            max_retries: 3,
            max_connect_failures: 1_000_000,
            backoff_initial_ms: 5,
            backoff_max_ms: 20,
            backoff_jitter: 0.0,
            backpressure_window_ms: 60_000,
            shutdown_grace_ms: 100,
        };
        let (controller, handle) = ReliabilityController::new(
            broker,
            BrokerCredentials::default(),
            QosLevel::AtLeastOnce,
            config,
        );
        let controller_task = tokio::spawn(controller.run());

        let eeg_metrics = handle.register_stream("eeg".into(), 0).await.unwrap();
        let aux_metrics = handle.register_stream("aux".into(), 5).await.unwrap();

        for seq in 1..=3 {
            assert_eq!(
                handle.submit(msg("eeg", seq)).await.unwrap(),
                SubmitOutcome::Queued
            );
        }

        // Budget holds only higher-priority data; the aux message is shed
        assert_eq!(
            handle.submit(msg("aux", 1)).await.unwrap(),
            SubmitOutcome::Dropped
        );

        // A high-priority enqueue displaces its own oldest pending message
        // rather than anything that outranks it
        assert_eq!(
            handle.submit(msg("eeg", 4)).await.unwrap(),
            SubmitOutcome::QueuedEvicting {
                victim: "eeg".into(),
                evicted_sequence: 1,
            }
        );

        handle.shutdown().await.unwrap();
        // Broker never came up, so shutdown discards whatever is queued
        controller_task.await.unwrap().unwrap();

        assert_eq!(aux_metrics.dropped(), 1);
        assert_eq!(eeg_metrics.dropped(), 1);
        assert_eq!(eeg_metrics.dropped_on_shutdown(), 3);
        assert_eq!(eeg_metrics.published(), 0);
    }
}
