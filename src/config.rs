//! Daemon configuration.
//!
//! Every knob is an environment variable with a documented default, so a bare
//! `hostwatch run` works without any setup. CLI flags override the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HostwatchError, Result};

/// Per-deployment alert thresholds.
///
/// A single active version; the alert engine consumes these as plain input
/// and never mutates them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub gpu_percent: f32,
    pub cpu_temp_celsius: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 90.0,
            ram_percent: 90.0,
            gpu_percent: 90.0,
            cpu_temp_celsius: 85.0,
        }
    }
}

/// Notifier channel endpoints. A channel with no endpoint configured is
/// disabled, never an error.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub slack_webhook: Option<String>,
    pub discord_webhook: Option<String>,
    pub webhook_url: Option<String>,
}

impl NotifierConfig {
    pub fn any_enabled(&self) -> bool {
        self.slack_webhook.is_some() || self.discord_webhook.is_some() || self.webhook_url.is_some()
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sampling interval for the collection tick.
    pub sample_interval: Duration,
    /// Retention window for metric samples and the alert audit log.
    pub retention: Duration,
    /// Cadence of the persistence flush tick.
    pub flush_interval: Duration,
    /// Cadence of the host display-name refresh tick.
    pub name_refresh_interval: Duration,
    /// Bind address for the HTTP query surface.
    pub http_addr: String,
    /// Directory holding the host id, metric series, and alert log.
    pub data_dir: PathBuf,
    pub thresholds: AlertThresholds,
    pub notifiers: NotifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            retention: Duration::from_secs(168 * 3600), // 7 days
            flush_interval: Duration::from_secs(30),
            name_refresh_interval: Duration::from_secs(600),
            http_addr: "127.0.0.1:9600".to_string(),
            data_dir: default_data_dir(),
            thresholds: AlertThresholds::default(),
            notifiers: NotifierConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("hostwatch")
}

impl Config {
    /// Build a configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(secs) = parse_env::<u64>("HOSTWATCH_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(HostwatchError::config(
                    "HOSTWATCH_INTERVAL_SECS must be at least 1",
                ));
            }
            config.sample_interval = Duration::from_secs(secs);
        }
        if let Some(hours) = parse_env::<u64>("HOSTWATCH_RETENTION_HOURS")? {
            if hours == 0 {
                return Err(HostwatchError::config(
                    "HOSTWATCH_RETENTION_HOURS must be at least 1",
                ));
            }
            config.retention = Duration::from_secs(hours * 3600);
        }
        if let Some(secs) = parse_env::<u64>("HOSTWATCH_FLUSH_SECS")? {
            config.flush_interval = Duration::from_secs(secs.max(1));
        }
        if let Ok(addr) = env::var("HOSTWATCH_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Ok(dir) = env::var("HOSTWATCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(v) = parse_env::<f32>("HOSTWATCH_ALERT_CPU")? {
            config.thresholds.cpu_percent = v;
        }
        if let Some(v) = parse_env::<f32>("HOSTWATCH_ALERT_RAM")? {
            config.thresholds.ram_percent = v;
        }
        if let Some(v) = parse_env::<f32>("HOSTWATCH_ALERT_GPU")? {
            config.thresholds.gpu_percent = v;
        }
        if let Some(v) = parse_env::<f32>("HOSTWATCH_ALERT_CPU_TEMP")? {
            config.thresholds.cpu_temp_celsius = v;
        }

        config.notifiers.slack_webhook = env::var("HOSTWATCH_SLACK_WEBHOOK").ok();
        config.notifiers.discord_webhook = env::var("HOSTWATCH_DISCORD_WEBHOOK").ok();
        config.notifiers.webhook_url = env::var("HOSTWATCH_WEBHOOK_URL").ok();

        Ok(config)
    }

    /// Samples collected per hour at the configured cadence. The trend
    /// analyzer uses this to scale index-based slopes to wall-clock hours.
    pub fn samples_per_hour(&self) -> f64 {
        3600.0 / self.sample_interval.as_secs_f64()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| HostwatchError::config(format!("invalid value for {}: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
