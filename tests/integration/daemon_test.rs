use std::time::Duration;

use hostwatch::config::Config;
use hostwatch::error::Result;
use hostwatch::monitor::{
    AlertKind, AlertStore, MetricStore, MonitorRuntime, MonitorState, RawSnapshot, SnapshotProvider,
};
use tempfile::TempDir;

/// Deterministic provider standing in for the OS sensors.
struct FixedProvider {
    cpu_percent: f32,
}

impl SnapshotProvider for FixedProvider {
    fn snapshot(&mut self) -> Result<RawSnapshot> {
        Ok(RawSnapshot {
            cpu_usage_percent: Some(self.cpu_percent),
            cpu_temperature_celsius: Some(45.0),
            core_count: Some(4),
            ram_used_bytes: Some(2 * 1024 * 1024 * 1024),
            ram_total_bytes: Some(8 * 1024 * 1024 * 1024),
            ram_temperature_celsius: None,
            gpu: None,
            net_rx_bytes_per_sec: Some(100),
            net_tx_bytes_per_sec: Some(200),
            uptime_seconds: 1_000,
        })
    }
}

fn fast_config(tmp: &TempDir) -> Config {
    Config {
        data_dir: tmp.path().to_path_buf(),
        sample_interval: Duration::from_millis(20),
        flush_interval: Duration::from_millis(50),
        name_refresh_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

#[tokio::test]
async fn ticks_fill_the_store_and_flush_persists() {
    let tmp = TempDir::new().unwrap();
    let state = MonitorState::init(fast_config(&tmp)).unwrap();
    let host_id = state.identity.id.clone();

    let monitor = MonitorRuntime::spawn(
        state.clone(),
        Box::new(FixedProvider { cpu_percent: 30.0 }),
    );
    tokio::time::sleep(Duration::from_millis(250)).await;
    monitor.shutdown(&state).await;

    let collected = state.store.sample_count(&host_id);
    assert!(collected >= 3, "expected several samples, got {}", collected);
    assert!(state.latest.read().is_some());

    // A fresh store sees what the shutdown flush persisted.
    let reloaded = MetricStore::open(tmp.path(), state.config.retention).unwrap();
    assert_eq!(reloaded.sample_count(&host_id), collected);
    let samples = reloaded.query(&host_id, 0);
    assert!(samples
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(samples[0].cpu.usage_percent, 30.0);
}

#[tokio::test]
async fn sustained_excursion_alerts_exactly_once_per_kind() {
    let tmp = TempDir::new().unwrap();
    let state = MonitorState::init(fast_config(&tmp)).unwrap();

    // 99% CPU crosses both the alert threshold and the throttle bound on
    // every tick; the latches must hold each to a single alert.
    let monitor = MonitorRuntime::spawn(
        state.clone(),
        Box::new(FixedProvider { cpu_percent: 99.0 }),
    );
    tokio::time::sleep(Duration::from_millis(250)).await;
    monitor.shutdown(&state).await;

    assert!(state.store.sample_count(&state.identity.id) >= 3);

    let alerts = state.alerts.query(None, 100);
    assert_eq!(alerts.len(), 2);
    let mut kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
    kinds.sort_by_key(|k| format!("{}", k));
    assert_eq!(kinds, vec![AlertKind::Cpu, AlertKind::Throttled]);

    // The audit log survives a restart.
    let reloaded = AlertStore::open(tmp.path(), state.config.retention).unwrap();
    assert_eq!(reloaded.count(None), 2);
}

#[tokio::test]
async fn provider_outage_skips_ticks_without_crashing() {
    struct FailingProvider;

    impl SnapshotProvider for FailingProvider {
        fn snapshot(&mut self) -> Result<RawSnapshot> {
            Err(hostwatch::HostwatchError::provider("sensor bus down"))
        }
    }

    let tmp = TempDir::new().unwrap();
    let state = MonitorState::init(fast_config(&tmp)).unwrap();

    let monitor = MonitorRuntime::spawn(state.clone(), Box::new(FailingProvider));
    tokio::time::sleep(Duration::from_millis(150)).await;
    monitor.shutdown(&state).await;

    // Nothing stored for skipped ticks, and the daemon stayed alive.
    assert_eq!(state.store.sample_count(&state.identity.id), 0);
    assert!(state.latest.read().is_none());
}
