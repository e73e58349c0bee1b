//! Read-side JSON API.
//!
//! All endpoints are pure reads over the shared monitor state. Field names
//! follow the dashboard wire contract (camelCase); internal types keep their
//! own naming and are mapped here.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{HostwatchError, Result};
use crate::monitor::collector::derive_status;
use crate::monitor::runtime::{LatestSnapshot, SharedState};
use crate::monitor::sample::{HostStatus, MetricSample};
use crate::monitor::trend::{TrendAnalyzer, TrendResult, MIN_TREND_SAMPLES, TREND_WINDOW};
use crate::monitor::Alert;

const DEFAULT_HISTORY_PERIOD_HOURS: u64 = 24;
const DEFAULT_ALERT_LIMIT: usize = 50;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetricsPayload {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub os: String,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    pub last_seen: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub metrics: MetricsPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub cpu: CpuPayload,
    pub ram: RamPayload,
    pub gpu: Option<GpuPayload>,
    pub power: PowerPayload,
    pub network: NetworkPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuPayload {
    pub usage_percent: f32,
    pub temperature_celsius: Option<f32>,
    pub core_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RamPayload {
    pub used_gb: f64,
    pub total_gb: f64,
    pub usage_percent: f32,
    pub temperature_celsius: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuPayload {
    pub usage_percent: f32,
    pub temperature_celsius: Option<f32>,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPayload {
    pub total_watts: f32,
    pub cpu_watts: f32,
    pub gpu_watts: f32,
    pub ram_watts: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPayload {
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsResponse {
    servers: Vec<HostMetricsPayload>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    host_id: String,
    period: String,
    data: Vec<HostMetricsPayload>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionsResponse {
    host_id: String,
    predictions: Vec<TrendResult>,
    analyzed_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertsResponse {
    alerts: Vec<Alert>,
    total: usize,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/history/{host_id}", get(get_history))
        .route("/predictions/{host_id}", get(get_predictions))
        .route("/alerts", get(get_alerts))
        .with_state(state)
}

/// Run the server until the shutdown future resolves. In-flight requests are
/// drained, not aborted.
pub async fn serve(
    state: SharedState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = state.config.http_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HostwatchError::http(format!("bind {}: {}", addr, e)))?;
    log::info!("HTTP API listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HostwatchError::http(e.to_string()))
}

// GET /health
async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

// GET /metrics (current snapshot for the hosts this instance authorizes)
async fn get_metrics(
    State(state): State<SharedState>,
) -> std::result::Result<Json<MetricsResponse>, StatusCode> {
    let latest = state.latest.read().clone();
    // Not ready until the first collection tick has landed.
    let Some(latest) = latest else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let payload = current_payload(&state, &latest);
    Ok(Json(MetricsResponse {
        servers: vec![payload],
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    period: Option<String>,
}

// GET /history/{host_id}?period=24h
async fn get_history(
    State(state): State<SharedState>,
    Path(host_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> std::result::Result<Json<HistoryResponse>, StatusCode> {
    let period = params
        .period
        .unwrap_or_else(|| format!("{}h", DEFAULT_HISTORY_PERIOD_HOURS));
    let hours = parse_period_hours(&period).ok_or(StatusCode::BAD_REQUEST)?;

    // The requested window never exceeds what retention can answer.
    let retention_hours = state.config.retention.as_secs() / 3600;
    let effective_hours = hours.min(retention_hours.max(1));
    let since = chrono::Utc::now().timestamp() - (effective_hours * 3600) as i64;

    let data = state
        .store
        .query(&host_id, since)
        .into_iter()
        .map(|sample| history_payload(&state, sample))
        .collect();

    Ok(Json(HistoryResponse {
        host_id,
        period,
        data,
    }))
}

// GET /predictions/{host_id}
async fn get_predictions(
    State(state): State<SharedState>,
    Path(host_id): Path<String>,
) -> Json<PredictionsResponse> {
    let window = state.store.recent(&host_id, TREND_WINDOW);
    let analyzed_points = window.len();

    // Too little history is a normal state, never an error status.
    if analyzed_points < MIN_TREND_SAMPLES {
        return Json(PredictionsResponse {
            host_id,
            predictions: Vec::new(),
            analyzed_points,
            message: Some(format!(
                "insufficient data: {} of {} required samples",
                analyzed_points, MIN_TREND_SAMPLES
            )),
        });
    }

    let analyzer = TrendAnalyzer::new(
        state.config.thresholds,
        state.config.samples_per_hour(),
    );
    let predictions = analyzer.analyze(&window);

    Json(PredictionsResponse {
        host_id,
        predictions,
        analyzed_points,
        message: None,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertParams {
    host_id: Option<String>,
    limit: Option<usize>,
}

// GET /alerts?hostId=&limit=
async fn get_alerts(
    State(state): State<SharedState>,
    Query(params): Query<AlertParams>,
) -> Json<AlertsResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    let host_id = params.host_id.as_deref();

    Json(AlertsResponse {
        alerts: state.alerts.query(host_id, limit),
        total: state.alerts.count(host_id),
    })
}

fn current_payload(state: &SharedState, latest: &LatestSnapshot) -> HostMetricsPayload {
    let now = chrono::Utc::now().timestamp();
    let status = crate::host::effective_status(
        latest.status,
        latest.sample.timestamp,
        now,
        state.stale_after(),
    );

    HostMetricsPayload {
        id: state.identity.id.clone(),
        name: state.identity.display_name(),
        hostname: state.identity.hostname().to_string(),
        os: state.identity.os().to_string(),
        status,
        uptime: Some(latest.uptime_seconds),
        last_seen: latest.sample.timestamp,
        timestamp: None,
        metrics: metrics_payload(&latest.sample),
    }
}

fn history_payload(state: &SharedState, sample: MetricSample) -> HostMetricsPayload {
    HostMetricsPayload {
        id: sample.host_id.clone(),
        name: state.identity.display_name(),
        hostname: state.identity.hostname().to_string(),
        os: state.identity.os().to_string(),
        status: derive_status(&sample),
        uptime: None,
        last_seen: sample.timestamp,
        timestamp: Some(sample.timestamp),
        metrics: metrics_payload(&sample),
    }
}

fn metrics_payload(sample: &MetricSample) -> MetricsPayload {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    MetricsPayload {
        cpu: CpuPayload {
            usage_percent: sample.cpu.usage_percent,
            temperature_celsius: sample.cpu.temperature_celsius,
            core_count: sample.cpu.core_count,
        },
        ram: RamPayload {
            used_gb: sample.ram.used_gb(),
            total_gb: sample.ram.total_gb(),
            usage_percent: sample.ram.usage_percent(),
            temperature_celsius: sample.ram.temperature_celsius,
        },
        gpu: sample.gpu.as_ref().map(|gpu| GpuPayload {
            usage_percent: gpu.usage_percent,
            temperature_celsius: gpu.temperature_celsius,
            memory_used_gb: gpu.memory_used_bytes as f64 / GB,
            memory_total_gb: gpu.memory_total_bytes as f64 / GB,
        }),
        power: PowerPayload {
            total_watts: sample.power.total_watts,
            cpu_watts: sample.power.cpu_watts,
            gpu_watts: sample.power.gpu_watts,
            ram_watts: sample.power.ram_watts,
        },
        network: NetworkPayload {
            rx_bytes_per_sec: sample.network.rx_bytes_per_sec,
            tx_bytes_per_sec: sample.network.tx_bytes_per_sec,
        },
    }
}

/// Accepts `"24h"` or a bare hour count.
fn parse_period_hours(period: &str) -> Option<u64> {
    let trimmed = period.trim().trim_end_matches(['h', 'H']);
    trimmed.parse::<u64>().ok().filter(|&h| h > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parsing() {
        assert_eq!(parse_period_hours("24h"), Some(24));
        assert_eq!(parse_period_hours("1H"), Some(1));
        assert_eq!(parse_period_hours("48"), Some(48));
        assert_eq!(parse_period_hours("0h"), None);
        assert_eq!(parse_period_hours("soon"), None);
    }
}
