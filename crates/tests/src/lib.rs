//! # Integration Tests
//!
//! End-to-end tests across the workspace crates.
//!
//! Covers:
//! - config to registry seeding
//! - listener -> controller -> reconstruction -> stores and CSV over the
//!   in-process bus
//! - failure paths (rejected connects, malformed events, store faults)

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ChannelKey, SensorRegistry};
    use persistence::MemoryStore;

    #[tokio::test]
    async fn test_config_seeds_registry() {
        let config = ConfigLoader::load_from_str(
            r#"
            [[devices]]
            id = "5b3e6f0a-8d7c-4c1e-9a43-2f1d7e0b9c11"
            name = "bench"

            [[devices.sensors]]
            name = "rpm"
            compact_key = 1

            [[devices.sensors]]
            name = "temp"
            compact_key = 10
            "#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let store = MemoryStore::from_config(&config);
        let sensors = store
            .find_all_by_device(config.devices[0].id)
            .await
            .unwrap();

        let mut keys: Vec<ChannelKey> = sensors.iter().map(|s| s.compact_key).collect();
        keys.sort();
        assert_eq!(keys, vec![ChannelKey::new(1), ChannelKey::new(10)]);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        ChannelKey, DeviceConfig, DeviceId, RawSample, SensorConfig, ServiceConfig, SessionStatus,
        SupervisionConfig,
    };
    use ingestion::{encode_connectivity, encode_control, encode_data, MessageBus};
    use persistence::{
        build_datums, parse_csv, ChannelResolver, CsvExporter, MemoryFaults, MemoryStore,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use session::{
        ConnectionListener, ListenerStats, SessionOutcome, SessionReport, SessionServices,
    };
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    /// Listener on a fresh bus with one registered device
    struct Harness {
        bus: MessageBus,
        store: Arc<MemoryStore>,
        config: ServiceConfig,
        device: DeviceId,
        reports: mpsc::UnboundedReceiver<SessionReport>,
        listener: JoinHandle<ListenerStats>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        async fn start(faults: MemoryFaults, supervision: SupervisionConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let device = DeviceId::random();

            let mut config = ServiceConfig::default();
            config.export.root = dir.path().to_path_buf();
            config.supervision = supervision;
            config.devices = vec![DeviceConfig {
                id: device,
                name: "bench".into(),
                sensors: vec![
                    SensorConfig {
                        sensor_id: Uuid::new_v4(),
                        name: "rpm".into(),
                        compact_key: ChannelKey::new(1),
                    },
                    SensorConfig {
                        sensor_id: Uuid::new_v4(),
                        name: "temp".into(),
                        compact_key: ChannelKey::new(2),
                    },
                ],
            }];

            let store = MemoryStore::with_faults(faults);
            for device_config in &config.devices {
                for sensor in &device_config.sensors {
                    store.register_sensor(device_config.id, sensor.into());
                }
            }
            let store = Arc::new(store);

            let bus = MessageBus::new(config.broker.channel_capacity);
            let services =
                SessionServices::shared(Arc::clone(&store), CsvExporter::new(dir.path()));
            let (tx, reports) = mpsc::unbounded_channel();
            let listener = ConnectionListener::new(bus.clone(), &config, services)
                .with_reports(tx)
                .spawn()
                .await
                .unwrap();

            Self {
                bus,
                store,
                config,
                device,
                reports,
                listener,
                dir,
            }
        }

        async fn default() -> Self {
            Self::start(MemoryFaults::default(), SupervisionConfig::default()).await
        }

        fn telemetry_topic(&self, device: &DeviceId) -> String {
            self.config.broker.telemetry_topic(device)
        }

        async fn announce(&self, active: bool, device: &DeviceId) {
            self.bus
                .publish(
                    &self.config.broker.connectivity_topic,
                    encode_connectivity(active, device),
                )
                .await;
        }

        /// Announce a connect and wait for the controller's subscription
        async fn connect(&self, device: &DeviceId) {
            self.announce(true, device).await;
            assert!(
                self.bus
                    .wait_for_subscribers(&self.telemetry_topic(device), 1, WAIT)
                    .await,
                "controller did not subscribe"
            );
        }

        /// Returns once every earlier connectivity event has been handled
        async fn barrier(&mut self) {
            let marker = DeviceId::random();
            self.connect(&marker).await;
            self.disconnect(&marker).await;
            let report = self.next_report().await;
            assert_eq!(report.device_id, marker);
        }

        async fn send(&self, device: &DeviceId, sample: RawSample) {
            self.bus
                .publish(&self.telemetry_topic(device), encode_data(&sample))
                .await;
        }

        async fn send_raw(&self, device: &DeviceId, payload: &'static str) {
            self.bus.publish(&self.telemetry_topic(device), payload).await;
        }

        async fn disconnect(&self, device: &DeviceId) {
            self.bus
                .publish(&self.telemetry_topic(device), encode_control(false))
                .await;
        }

        async fn next_report(&mut self) -> SessionReport {
            tokio::time::timeout(WAIT, self.reports.recv())
                .await
                .expect("timed out waiting for a session report")
                .expect("report channel closed")
        }

        async fn finish(self) -> (ListenerStats, Vec<SessionReport>) {
            self.bus.shutdown();
            let stats = tokio::time::timeout(WAIT, self.listener)
                .await
                .expect("listener did not stop")
                .unwrap();

            let mut reports = self.reports;
            let mut remaining = Vec::new();
            while let Some(report) = reports.recv().await {
                remaining.push(report);
            }
            (stats, remaining)
        }
    }

    /// Connect -> sparse telemetry -> disconnect -> datums, closed session, CSV
    #[tokio::test]
    async fn test_e2e_session_lifecycle() {
        let mut h = Harness::default().await;
        let device = h.device;

        h.connect(&device).await;
        h.send(&device, RawSample::from_pairs(0, [(1, 800)])).await;
        h.send(&device, RawSample::from_pairs(2, [(2, 40)])).await;
        h.send(&device, RawSample::from_pairs(3, [(1, 810)])).await;
        h.disconnect(&device).await;

        let report = h.next_report().await;
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.samples, 3);
        assert_eq!(report.rows, 4);
        // rpm at ticks 0..=3, temp from tick 2
        assert_eq!(report.datums, 6);

        let session = h.store.session(report.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
        assert_eq!(session.end_time, Some(session.start_time + 3));
        assert_eq!(session.export_path, report.csv_path);

        let csv_path = report.csv_path.clone().unwrap();
        assert_eq!(
            csv_path,
            h.dir
                .path()
                .join(device.to_string())
                .join(format!("{}.csv", session.name))
        );
        let parsed = parse_csv(&std::fs::read_to_string(&csv_path).unwrap()).unwrap();
        assert_eq!(parsed.header, vec!["rpm", "temp"]);
        assert_eq!(
            parsed.column("rpm").unwrap(),
            vec![Some(800), Some(800), Some(800), Some(810)]
        );
        assert_eq!(
            parsed.column("temp").unwrap(),
            vec![None, None, Some(40), Some(40)]
        );

        let mut datums = h.store.datums_for(report.session_id);
        datums.sort_by_key(|d| (d.timestamp, d.value));
        assert_eq!(datums.len(), 6);
        assert!(datums.iter().all(|d| d.session_id == report.session_id));
        assert_eq!(datums.last().unwrap().timestamp, 3);

        let (stats, rest) = h.finish().await;
        assert!(rest.is_empty());
        assert_eq!(stats.sessions_started, 1);
        assert_eq!(stats.sessions_finished, 1);
    }

    #[tokio::test]
    async fn test_unresolved_channel_exported_not_stored() {
        let mut h = Harness::default().await;
        let device = h.device;

        h.connect(&device).await;
        h.send(&device, RawSample::from_pairs(0, [(1, 5), (99, 7)]))
            .await;
        h.send(&device, RawSample::from_pairs(1, [(99, 8)])).await;
        h.disconnect(&device).await;

        let report = h.next_report().await;
        assert_eq!(report.outcome, SessionOutcome::Completed);
        // only rpm resolves
        assert_eq!(report.datums, 2);

        let parsed =
            parse_csv(&std::fs::read_to_string(report.csv_path.unwrap()).unwrap()).unwrap();
        assert_eq!(parsed.header, vec!["rpm", "99"]);
        assert_eq!(parsed.column("99").unwrap(), vec![Some(7), Some(8)]);

        h.finish().await;
    }

    #[tokio::test]
    async fn test_disconnect_without_telemetry() {
        let mut h = Harness::default().await;
        let device = h.device;

        h.connect(&device).await;
        h.disconnect(&device).await;

        let report = h.next_report().await;
        assert_eq!(report.outcome, SessionOutcome::Empty);
        assert!(report.csv_path.is_none());

        let session = h.store.session(report.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
        assert_eq!(session.end_time, Some(session.start_time));
        assert_eq!(h.store.datum_count(), 0);

        h.finish().await;
    }

    #[tokio::test]
    async fn test_duplicate_connect_rejected_until_disconnect() {
        let mut h = Harness::default().await;
        let device = h.device;

        h.connect(&device).await;
        h.announce(true, &device).await;
        h.barrier().await;
        assert_eq!(h.bus.subscriber_count(&h.telemetry_topic(&device)), 1);

        h.send(&device, RawSample::from_pairs(0, [(1, 1)])).await;
        h.disconnect(&device).await;
        let first = h.next_report().await;
        assert_eq!(first.device_id, device);
        assert_eq!(first.outcome, SessionOutcome::Completed);

        h.connect(&device).await;
        h.disconnect(&device).await;
        let second = h.next_report().await;
        assert_ne!(first.session_id, second.session_id);

        let (stats, _) = h.finish().await;
        assert_eq!(stats.rejected, 1);
        // device twice plus the barrier marker
        assert_eq!(stats.sessions_started, 3);
        assert_eq!(stats.sessions_finished, 3);
    }

    #[tokio::test]
    async fn test_malformed_events_are_skipped() {
        let mut h = Harness::default().await;
        let device = h.device;
        let topic = h.config.broker.connectivity_topic.clone();

        h.bus.publish(&topic, "not json").await;
        h.bus
            .publish(&topic, r#"{"active": true, "device": "not-a-uuid"}"#)
            .await;
        h.bus.publish(&topic, r#"{"device": "x"}"#).await;
        // disconnect on the connectivity topic is ignored
        h.announce(false, &device).await;

        h.connect(&device).await;
        h.send_raw(&device, "{broken").await;
        h.send_raw(&device, r#"{"1": 4}"#).await;
        h.send_raw(&device, r#"{"ts": 0, "1": "x"}"#).await;
        h.send(&device, RawSample::from_pairs(1, [(1, 3)])).await;
        h.disconnect(&device).await;

        let report = h.next_report().await;
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.samples, 1);
        assert_eq!(report.rows, 2);

        let (stats, _) = h.finish().await;
        assert_eq!(stats.malformed, 3);
        assert_eq!(stats.sessions_started, 1);
    }

    #[tokio::test]
    async fn test_insert_failure_marks_session_failed() {
        let mut h = Harness::start(
            MemoryFaults {
                fail_inserts: true,
                ..MemoryFaults::default()
            },
            SupervisionConfig::default(),
        )
        .await;
        let device = h.device;

        h.connect(&device).await;
        h.send(&device, RawSample::from_pairs(0, [(1, 1)])).await;
        h.disconnect(&device).await;

        let report = h.next_report().await;
        assert_eq!(report.outcome, SessionOutcome::Failed);
        assert!(report.error.is_some());

        let session = h.store.session(report.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.end_time, None);
        assert_eq!(h.store.datum_count(), 0);

        // the device can start over
        h.connect(&device).await;
        h.finish().await;
    }

    #[tokio::test]
    async fn test_create_failure_leaves_device_free() {
        let h = Harness::start(
            MemoryFaults {
                fail_create: true,
                ..MemoryFaults::default()
            },
            SupervisionConfig::default(),
        )
        .await;
        let device = h.device;

        h.announce(true, &device).await;
        h.announce(true, &device).await;

        let (stats, reports) = h.finish().await;
        assert!(reports.is_empty());
        assert_eq!(stats.sessions_started, 0);
        assert_eq!(stats.rejected, 2);
    }

    #[tokio::test]
    async fn test_concurrent_devices_are_independent() {
        let mut h = Harness::default().await;
        let a = h.device;
        let b = DeviceId::random();

        h.connect(&a).await;
        h.connect(&b).await;
        for tick in 0..5u64 {
            h.send(&a, RawSample::from_pairs(tick, [(1, tick as i64)])).await;
            h.send(&b, RawSample::from_pairs(tick * 2, [(1, -(tick as i64))]))
                .await;
        }
        h.disconnect(&b).await;
        let first = h.next_report().await;
        assert_eq!(first.device_id, b);
        assert_eq!(first.rows, 9);
        // b has no registered sensors
        assert_eq!(first.datums, 0);

        h.disconnect(&a).await;
        let second = h.next_report().await;
        assert_eq!(second.device_id, a);
        assert_eq!(second.rows, 5);
        assert_eq!(second.datums, 5);

        h.finish().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_open_sessions() {
        let h = Harness::default().await;
        let device = h.device;
        let store = Arc::clone(&h.store);

        h.connect(&device).await;
        h.send(&device, RawSample::from_pairs(0, [(1, 1)])).await;

        let (stats, reports) = h.finish().await;
        assert_eq!(stats.sessions_finished, 1);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, SessionOutcome::Failed);
        assert_eq!(
            store.session(reports[0].session_id).unwrap().status,
            SessionStatus::Failed
        );
    }

    /// A tick far past the bound fails only its own session
    #[tokio::test]
    async fn test_e2e_huge_tick_fails_session_not_process() {
        let mut h = Harness::start(
            MemoryFaults::default(),
            SupervisionConfig {
                max_session_ticks: 10_000,
                ..SupervisionConfig::default()
            },
        )
        .await;
        let device = h.device;
        let other = DeviceId::random();

        h.connect(&device).await;
        h.connect(&other).await;
        h.send(&device, RawSample::from_pairs(0, [(1, 1)])).await;
        h.send_raw(&device, r#"{"ts": 1099511627776, "1": 2}"#).await;
        h.disconnect(&device).await;

        let report = h.next_report().await;
        assert_eq!(report.device_id, device);
        assert_eq!(report.outcome, SessionOutcome::Failed);
        assert_eq!(
            h.store.session(report.session_id).unwrap().status,
            SessionStatus::Failed
        );

        h.send(&other, RawSample::from_pairs(1, [(1, 5)])).await;
        h.disconnect(&other).await;
        let report = h.next_report().await;
        assert_eq!(report.device_id, other);
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.rows, 2);

        let (stats, _) = h.finish().await;
        assert_eq!(stats.sessions_started, 2);
        assert_eq!(stats.aborted, 0);
    }

    #[tokio::test]
    async fn test_capacity_limit_rejects_extra_devices() {
        let mut h = Harness::start(
            MemoryFaults::default(),
            SupervisionConfig {
                reject_duplicate_connect: true,
                max_active_sessions: Some(1),
                ..SupervisionConfig::default()
            },
        )
        .await;
        let device = h.device;
        let other = DeviceId::random();

        h.connect(&device).await;
        h.announce(true, &other).await;
        assert!(
            !h.bus
                .wait_for_subscribers(&h.telemetry_topic(&other), 1, Duration::from_millis(200))
                .await
        );
        h.disconnect(&device).await;
        h.next_report().await;

        let (stats, _) = h.finish().await;
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.sessions_finished, 1);
    }

    /// Stored datums match an offline reconstruction of the same arrivals
    #[tokio::test]
    async fn test_randomized_sessions_match_offline_reconstruction() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut h = Harness::default().await;
        let device = h.device;

        for _ in 0..5 {
            let mut samples = Vec::new();
            let mut tick = 0u64;
            for _ in 0..rng.random_range(1..60usize) {
                tick += rng.random_range(0..4u64);
                let mut pairs = Vec::new();
                for key in 1..=3u32 {
                    if rng.random_bool(0.5) {
                        pairs.push((key, rng.random_range(-500..500i64)));
                    }
                }
                samples.push(RawSample::from_pairs(tick, pairs));
            }

            h.connect(&device).await;
            for sample in &samples {
                h.send(&device, sample.clone()).await;
            }
            h.disconnect(&device).await;
            let report = h.next_report().await;
            assert_eq!(report.outcome, SessionOutcome::Completed);

            let offline = reconstructor::reconstruct(&samples).unwrap();
            let mapping = ChannelResolver::new(Arc::clone(&h.store))
                .resolve(device, &offline.series.channel_keys())
                .await
                .unwrap();
            let mut expected = build_datums(report.session_id, &offline.series, &mapping);
            let mut stored = h.store.datums_for(report.session_id);

            let order = |d: &contracts::Datum| (d.timestamp, d.sensor_id, d.value);
            expected.sort_by_key(order);
            stored.sort_by_key(order);
            assert_eq!(stored, expected);
            assert_eq!(report.rows, offline.stats.rows);

            let session = h.store.session(report.session_id).unwrap();
            assert_eq!(
                session.end_time,
                Some(session.start_time + offline.stats.max_observed_tick as i64)
            );
        }

        h.finish().await;
    }
}
