use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use hostwatch::config::Config;
use hostwatch::http::build_router;
use hostwatch::monitor::runtime::LatestSnapshot;
use hostwatch::monitor::{
    Alert, AlertKind, AlertSeverity, CpuSample, HostStatus, MetricSample, MonitorState, RamSample,
    SharedState,
};
use tempfile::TempDir;

fn test_state(tmp: &TempDir) -> SharedState {
    let config = Config {
        data_dir: tmp.path().to_path_buf(),
        ..Default::default()
    };
    MonitorState::init(config).unwrap()
}

fn cpu_sample(host_id: &str, timestamp: i64, cpu: f32) -> MetricSample {
    MetricSample {
        host_id: host_id.to_string(),
        timestamp,
        cpu: CpuSample {
            usage_percent: cpu,
            temperature_celsius: Some(50.0),
            core_count: 8,
        },
        ram: RamSample {
            used_bytes: 4 * 1024 * 1024 * 1024,
            total_bytes: 16 * 1024 * 1024 * 1024,
            temperature_celsius: None,
        },
        ..Default::default()
    }
}

async fn get_json(
    state: SharedState,
    uri: &str,
) -> (StatusCode, serde_json::Value) {
    let response = build_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = get_json(test_state(&tmp), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn metrics_is_unavailable_before_first_tick() {
    let tmp = TempDir::new().unwrap();
    let (status, _) = get_json(test_state(&tmp), "/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_returns_current_snapshot() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    let host_id = state.identity.id.clone();
    let now = chrono::Utc::now().timestamp();

    *state.latest.write() = Some(LatestSnapshot {
        sample: cpu_sample(&host_id, now, 42.5),
        status: HostStatus::Online,
        uptime_seconds: 12_345,
    });

    let (status, body) = get_json(state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let server = &body["servers"][0];
    assert_eq!(server["id"], host_id);
    assert_eq!(server["status"], "online");
    assert_eq!(server["uptime"], 12_345);
    assert_eq!(server["lastSeen"], now);
    assert_eq!(server["metrics"]["cpu"]["usagePercent"], 42.5);
    assert_eq!(server["metrics"]["cpu"]["coreCount"], 8);
    assert_eq!(server["metrics"]["ram"]["usagePercent"], 25.0);
    // No GPU controller serializes as null, not as an error.
    assert!(server["metrics"]["gpu"].is_null());
}

#[tokio::test]
async fn stale_snapshot_reads_as_offline() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    let host_id = state.identity.id.clone();
    let old = chrono::Utc::now().timestamp() - 3600;

    *state.latest.write() = Some(LatestSnapshot {
        sample: cpu_sample(&host_id, old, 42.5),
        status: HostStatus::Online,
        uptime_seconds: 1,
    });

    let (_, body) = get_json(state, "/metrics").await;
    assert_eq!(body["servers"][0]["status"], "offline");
}

#[tokio::test]
async fn history_is_ascending_and_bounded() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    let now = chrono::Utc::now().timestamp();

    // Two days of hourly samples, oldest first, offset half an hour so the
    // period boundary never lands exactly on a sample.
    for i in (0..48).rev() {
        state
            .store
            .append(cpu_sample("h-1", now - 1800 - i * 3600, 10.0));
    }

    let (status, body) = get_json(state, "/history/h-1?period=6h").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hostId"], "h-1");
    assert_eq!(body["period"], "6h");

    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 6);
    let timestamps: Vec<i64> = data
        .iter()
        .map(|d| d["timestamp"].as_i64().unwrap())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
}

#[tokio::test]
async fn history_rejects_bad_period() {
    let tmp = TempDir::new().unwrap();
    let (status, _) = get_json(test_state(&tmp), "/history/h-1?period=soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn predictions_report_insufficient_data() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    let now = chrono::Utc::now().timestamp();

    for i in 0..4 {
        state.store.append(cpu_sample("h-1", now - 20 + i * 5, 50.0));
    }

    let (status, body) = get_json(state, "/predictions/h-1").await;
    // A short history is a normal state, not an error.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzedPoints"], 4);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 0);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("insufficient data"));
}

#[tokio::test]
async fn predictions_surface_rising_cpu() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    let now = chrono::Utc::now().timestamp();

    // Steady climb from 50% to 79% over 30 samples.
    for i in 0..30 {
        state
            .store
            .append(cpu_sample("h-1", now - 150 + i * 5, 50.0 + i as f32));
    }

    let (status, body) = get_json(state, "/predictions/h-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzedPoints"], 30);
    assert!(body["message"].is_null());

    let predictions = body["predictions"].as_array().unwrap();
    let cpu = predictions
        .iter()
        .find(|p| p["kind"] == "cpu")
        .expect("cpu prediction expected");
    assert_eq!(cpu["confidence"], "high");
    assert!(cpu["hoursToThreshold"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn alerts_filter_and_count() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    let now = chrono::Utc::now().timestamp();

    for (i, host) in ["a", "a", "b"].iter().enumerate() {
        state.alerts.record(Alert {
            id: format!("alert-{}", i),
            timestamp: now + i as i64,
            host_id: host.to_string(),
            host_name: host.to_string(),
            subject: format!("cpu alert on {}", host),
            body: "CPU usage at 95.0% (threshold: 90.0%)".to_string(),
            kind: AlertKind::Cpu,
            severity: AlertSeverity::Warning,
        });
    }

    let (status, body) = get_json(state.clone(), "/alerts?hostId=a&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    // Most recent first.
    assert_eq!(alerts[0]["id"], "alert-1");
    assert_eq!(alerts[0]["hostId"], "a");

    let (_, body) = get_json(state, "/alerts").await;
    assert_eq!(body["total"], 3);
}
