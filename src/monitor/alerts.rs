//! Edge-triggered threshold alerting.
//!
//! One latch per (host, metric kind). An alert is emitted only on the
//! quiet -> firing transition; a sustained excursion stays silent until the
//! value returns to or below its threshold and crosses again.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AlertThresholds;
use crate::monitor::sample::{HostStatus, MetricSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Cpu,
    Ram,
    Gpu,
    Temperature,
    Throttled,
    Leak,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::Cpu => "cpu",
            AlertKind::Ram => "ram",
            AlertKind::Gpu => "gpu",
            AlertKind::Temperature => "temperature",
            AlertKind::Throttled => "throttled",
            AlertKind::Leak => "leak",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Error,
}

/// A persisted, immutable record of one emitted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub timestamp: i64,
    pub host_id: String,
    pub host_name: String,
    pub subject: String,
    pub body: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
}

/// Per-host, per-kind latch machine over the configured thresholds.
///
/// Latches are in-memory and live for the process lifetime; they are created
/// lazily on first evaluation of a (host, kind) pair.
pub struct AlertEngine {
    thresholds: AlertThresholds,
    latches: HashMap<(String, AlertKind), bool>,
}

impl AlertEngine {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            latches: HashMap::new(),
        }
    }

    /// Evaluate one sample against every metric kind. Each kind has an
    /// independent latch, so simultaneous excursions yield one alert each.
    /// Returned alerts are already latched: the caller persists and
    /// dispatches them, and delivery outcomes must not feed back here.
    pub fn evaluate(
        &mut self,
        sample: &MetricSample,
        status: HostStatus,
        host_name: &str,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let t = self.thresholds;

        let cpu = sample.cpu.usage_percent;
        if let Some(alert) = self.transition(sample, host_name, AlertKind::Cpu, cpu > t.cpu_percent, || {
            (
                AlertSeverity::Warning,
                format!(
                    "CPU usage at {:.1}% (threshold: {:.1}%)",
                    cpu, t.cpu_percent
                ),
            )
        }) {
            alerts.push(alert);
        }

        let ram = sample.ram.usage_percent();
        if let Some(alert) = self.transition(sample, host_name, AlertKind::Ram, ram > t.ram_percent, || {
            (
                AlertSeverity::Warning,
                format!(
                    "RAM usage at {:.1}% (threshold: {:.1}%)",
                    ram, t.ram_percent
                ),
            )
        }) {
            alerts.push(alert);
        }

        // Hosts without a GPU controller are skipped entirely, including
        // latch bookkeeping.
        if let Some(gpu) = &sample.gpu {
            let usage = gpu.usage_percent;
            if let Some(alert) =
                self.transition(sample, host_name, AlertKind::Gpu, usage > t.gpu_percent, || {
                    (
                        AlertSeverity::Warning,
                        format!(
                            "GPU usage at {:.1}% (threshold: {:.1}%)",
                            usage, t.gpu_percent
                        ),
                    )
                })
            {
                alerts.push(alert);
            }
        }

        // A missing temperature reading counts as quiet so a stuck latch
        // releases once the sensor disappears.
        let temp = sample.cpu.temperature_celsius;
        let temp_firing = temp.is_some_and(|v| v > t.cpu_temp_celsius);
        if let Some(alert) = self.transition(sample, host_name, AlertKind::Temperature, temp_firing, || {
            (
                AlertSeverity::Error,
                format!(
                    "CPU temperature at {:.1}\u{b0}C (threshold: {:.1}\u{b0}C)",
                    temp.unwrap_or_default(),
                    t.cpu_temp_celsius
                ),
            )
        }) {
            alerts.push(alert);
        }

        // Throttled is driven by derived status, not a numeric threshold,
        // with the same latch discipline.
        let throttled = status == HostStatus::Throttled;
        if let Some(alert) = self.transition(sample, host_name, AlertKind::Throttled, throttled, || {
            (
                AlertSeverity::Error,
                format!(
                    "Host is throttled (cpu {:.1}%, temperature {})",
                    sample.cpu.usage_percent,
                    sample
                        .cpu
                        .temperature_celsius
                        .map(|v| format!("{:.1}\u{b0}C", v))
                        .unwrap_or_else(|| "n/a".to_string())
                ),
            )
        }) {
            alerts.push(alert);
        }

        alerts
    }

    /// Apply one latch transition. Emits only on quiet -> firing.
    fn transition(
        &mut self,
        sample: &MetricSample,
        host_name: &str,
        kind: AlertKind,
        firing_now: bool,
        describe: impl FnOnce() -> (AlertSeverity, String),
    ) -> Option<Alert> {
        let latch = self
            .latches
            .entry((sample.host_id.clone(), kind))
            .or_insert(false);

        match (*latch, firing_now) {
            (false, true) => {
                *latch = true;
                let (severity, body) = describe();
                Some(Alert {
                    id: uuid::Uuid::new_v4().to_string(),
                    timestamp: sample.timestamp,
                    host_id: sample.host_id.clone(),
                    host_name: host_name.to_string(),
                    subject: format!("{} alert on {}", kind, host_name),
                    body,
                    kind,
                    severity,
                })
            }
            (true, false) => {
                *latch = false;
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::sample::{CpuSample, GpuSample, RamSample};

    fn sample(cpu: f32, ram_percent: f32, temp: Option<f32>) -> MetricSample {
        MetricSample {
            host_id: "h".to_string(),
            timestamp: 1_000,
            cpu: CpuSample {
                usage_percent: cpu,
                temperature_celsius: temp,
                core_count: 4,
            },
            ram: RamSample {
                used_bytes: (ram_percent * 10.0) as u64,
                total_bytes: 1_000,
                temperature_celsius: None,
            },
            ..Default::default()
        }
    }

    fn engine() -> AlertEngine {
        AlertEngine::new(AlertThresholds::default())
    }

    #[test]
    fn rising_crossing_fires_exactly_once() {
        let mut engine = engine();

        let quiet = engine.evaluate(&sample(50.0, 10.0, None), HostStatus::Online, "h");
        assert!(quiet.is_empty());

        let fired = engine.evaluate(&sample(91.0, 10.0, None), HostStatus::Online, "h");
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::Cpu);
        assert_eq!(fired[0].severity, AlertSeverity::Warning);

        // Sustained excursion stays silent.
        for _ in 0..5 {
            let again = engine.evaluate(&sample(93.0, 10.0, None), HostStatus::Online, "h");
            assert!(again.is_empty());
        }
    }

    #[test]
    fn re_crossing_fires_again() {
        let mut engine = engine();

        assert_eq!(
            engine
                .evaluate(&sample(91.0, 10.0, None), HostStatus::Online, "h")
                .len(),
            1
        );
        // Drop to the threshold releases the latch without emitting.
        assert!(engine
            .evaluate(&sample(90.0, 10.0, None), HostStatus::Online, "h")
            .is_empty());
        assert_eq!(
            engine
                .evaluate(&sample(91.0, 10.0, None), HostStatus::Online, "h")
                .len(),
            1
        );
    }

    #[test]
    fn value_at_threshold_does_not_fire() {
        let mut engine = engine();
        let alerts = engine.evaluate(&sample(90.0, 10.0, None), HostStatus::Online, "h");
        assert!(alerts.is_empty());
    }

    #[test]
    fn simultaneous_excursions_are_independent() {
        let mut engine = engine();

        let alerts = engine.evaluate(&sample(91.0, 10.0, Some(88.0)), HostStatus::Online, "h");
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AlertKind::Cpu));
        assert!(kinds.contains(&AlertKind::Temperature));
        assert_eq!(alerts.len(), 2);

        // CPU recovers while temperature stays high: no new alerts either way.
        let alerts = engine.evaluate(&sample(40.0, 10.0, Some(88.0)), HostStatus::Online, "h");
        assert!(alerts.is_empty());

        // CPU crosses again independently of the still-latched temperature.
        let alerts = engine.evaluate(&sample(91.0, 10.0, Some(88.0)), HostStatus::Online, "h");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Cpu);
    }

    #[test]
    fn gpu_skipped_without_controller() {
        let mut engine = engine();
        let mut s = sample(10.0, 10.0, None);
        s.gpu = None;
        assert!(engine.evaluate(&s, HostStatus::Online, "h").is_empty());

        s.gpu = Some(GpuSample {
            usage_percent: 99.0,
            temperature_celsius: None,
            memory_used_bytes: 0,
            memory_total_bytes: 0,
        });
        let alerts = engine.evaluate(&s, HostStatus::Online, "h");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Gpu);
    }

    #[test]
    fn throttled_uses_latch_discipline() {
        let mut engine = engine();
        let s = sample(50.0, 10.0, None);

        let fired = engine.evaluate(&s, HostStatus::Throttled, "h");
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::Throttled);
        assert_eq!(fired[0].severity, AlertSeverity::Error);

        assert!(engine.evaluate(&s, HostStatus::Throttled, "h").is_empty());
        assert!(engine.evaluate(&s, HostStatus::Online, "h").is_empty());
        assert_eq!(engine.evaluate(&s, HostStatus::Throttled, "h").len(), 1);
    }

    #[test]
    fn separate_hosts_have_separate_latches() {
        let mut engine = engine();

        let mut a = sample(91.0, 10.0, None);
        a.host_id = "a".to_string();
        let mut b = sample(91.0, 10.0, None);
        b.host_id = "b".to_string();

        assert_eq!(engine.evaluate(&a, HostStatus::Online, "a").len(), 1);
        assert_eq!(engine.evaluate(&b, HostStatus::Online, "b").len(), 1);
    }
}
