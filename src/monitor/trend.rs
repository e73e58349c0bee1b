//! Forward-looking signals from recent history.
//!
//! Fits an ordinary least-squares line to a sliding window of samples and
//! classifies the fit quality into a coarse confidence bucket. The x-axis is
//! sample order (0..n-1), not wall-clock time: sample spacing is assumed
//! uniform at the configured cadence, and the projection to hours derives its
//! scaling from that cadence.

use serde::Serialize;

use crate::config::AlertThresholds;
use crate::monitor::alerts::{AlertKind, AlertSeverity};
use crate::monitor::sample::MetricSample;

/// Sliding window length for trend fitting.
pub const TREND_WINDOW: usize = 100;
/// Below this many samples the analyzer reports "insufficient data".
pub const MIN_TREND_SAMPLES: usize = 10;
/// The leak heuristic needs a longer baseline than plain trends.
pub const MIN_LEAK_SAMPLES: usize = 20;

/// RAM growth below this (GB per sample) is treated as flat.
const LEAK_SLOPE_EPSILON_GB: f64 = 0.001;
/// A single-step drop at least this fraction of the window's value range
/// counts as a release event and rules out a leak.
const LEAK_RELEASE_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Bucket a coefficient of determination.
    pub fn from_r_squared(r_squared: f64) -> Self {
        if r_squared > 0.7 {
            Confidence::High
        } else if r_squared > 0.4 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// One derived prediction. Never persisted; recomputed per query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub kind: AlertKind,
    pub slope: f64,
    pub average: f64,
    pub confidence: Confidence,
    pub severity: AlertSeverity,
    pub message: String,
    pub current_value: f64,
    pub hours_to_threshold: Option<f64>,
}

/// Ordinary least-squares fit over the index sequence 0..n-1.
#[derive(Debug, Clone, Copy)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub mean: f64,
    pub r_squared: f64,
}

/// Fit a line through `values` with x = sample index. Returns `None` for
/// fewer than two points or a degenerate x spread.
pub fn fit_line(values: &[f64]) -> Option<LinearFit> {
    let n = values.len() as f64;
    if values.len() < 2 {
        return None;
    }

    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64) * (i as f64)).sum();

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom.abs() < 1e-10 {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    let mean = sum_y / n;

    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let predicted = slope * i as f64 + intercept;
            (y - predicted).powi(2)
        })
        .sum();
    let ss_tot: f64 = values.iter().map(|y| (y - mean).powi(2)).sum();
    let r_squared = if ss_tot > 1e-10 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };

    Some(LinearFit {
        slope,
        intercept,
        mean,
        r_squared,
    })
}

struct MetricParams {
    kind: AlertKind,
    threshold: f64,
    /// Slopes below this are noise, not a trend.
    min_slope: f64,
    /// Averages below this are not worth predicting about.
    floor: f64,
    unit: &'static str,
}

pub struct TrendAnalyzer {
    thresholds: AlertThresholds,
    samples_per_hour: f64,
}

impl TrendAnalyzer {
    pub fn new(thresholds: AlertThresholds, samples_per_hour: f64) -> Self {
        Self {
            thresholds,
            samples_per_hour,
        }
    }

    /// Analyze an ascending window of samples (the most recent
    /// [`TREND_WINDOW`]). Returns an empty vec below [`MIN_TREND_SAMPLES`];
    /// the caller distinguishes that as "insufficient data".
    pub fn analyze(&self, samples: &[MetricSample]) -> Vec<TrendResult> {
        if samples.len() < MIN_TREND_SAMPLES {
            return Vec::new();
        }

        let params = [
            MetricParams {
                kind: AlertKind::Cpu,
                threshold: self.thresholds.cpu_percent as f64,
                min_slope: 0.05,
                floor: 40.0,
                unit: "%",
            },
            MetricParams {
                kind: AlertKind::Ram,
                threshold: self.thresholds.ram_percent as f64,
                min_slope: 0.05,
                floor: 50.0,
                unit: "%",
            },
            MetricParams {
                kind: AlertKind::Gpu,
                threshold: self.thresholds.gpu_percent as f64,
                min_slope: 0.05,
                floor: 40.0,
                unit: "%",
            },
            MetricParams {
                kind: AlertKind::Temperature,
                threshold: self.thresholds.cpu_temp_celsius as f64,
                min_slope: 0.02,
                floor: 55.0,
                unit: "\u{b0}C",
            },
        ];

        let mut results = Vec::new();
        for p in params {
            let values = metric_series(samples, p.kind);
            if values.len() < MIN_TREND_SAMPLES {
                continue;
            }
            if let Some(result) = self.analyze_metric(&values, &p) {
                results.push(result);
            }
        }

        if let Some(leak) = self.detect_leak(samples) {
            results.push(leak);
        }

        results
    }

    fn analyze_metric(&self, values: &[f64], p: &MetricParams) -> Option<TrendResult> {
        let fit = fit_line(values)?;

        // Near-flat or low-baseline series produce noisy projections, so
        // both gates must pass before anything is reported.
        if fit.slope <= p.min_slope || fit.mean <= p.floor {
            return None;
        }

        let confidence = Confidence::from_r_squared(fit.r_squared);
        let current_value = *values.last()?;
        let hours_to_threshold = if fit.mean < p.threshold {
            Some((p.threshold - fit.mean) / fit.slope / self.samples_per_hour)
        } else {
            None
        };

        let message = match hours_to_threshold {
            Some(hours) => format!(
                "{} rising at {:.2}{}/sample (avg {:.1}{}), ~{:.1}h to the {:.0}{} threshold",
                p.kind, fit.slope, p.unit, fit.mean, p.unit, hours, p.threshold, p.unit
            ),
            None => format!(
                "{} rising at {:.2}{}/sample and already above the {:.0}{} threshold (avg {:.1}{})",
                p.kind, fit.slope, p.unit, p.threshold, p.unit, fit.mean, p.unit
            ),
        };

        Some(TrendResult {
            kind: p.kind,
            slope: fit.slope,
            average: fit.mean,
            confidence,
            severity: AlertSeverity::Warning,
            message,
            current_value,
            hours_to_threshold,
        })
    }

    /// Classify sustained monotonic RAM growth without a release event.
    ///
    /// Advisory only: re-evaluated fresh on each query and deliberately kept
    /// away from the alert engine's latches.
    pub fn detect_leak(&self, samples: &[MetricSample]) -> Option<TrendResult> {
        if samples.len() < MIN_LEAK_SAMPLES {
            return None;
        }

        let values: Vec<f64> = samples.iter().map(|s| s.ram.used_gb()).collect();
        let fit = fit_line(&values)?;

        if fit.slope <= LEAK_SLOPE_EPSILON_GB {
            return None;
        }
        if Confidence::from_r_squared(fit.r_squared) != Confidence::High {
            return None;
        }

        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range <= 0.0 {
            return None;
        }

        // Any real plateau or release shows up as one sizable downward step.
        let largest_drop = values
            .windows(2)
            .map(|w| w[0] - w[1])
            .fold(0.0_f64, f64::max);
        if largest_drop >= range * LEAK_RELEASE_FRACTION {
            return None;
        }

        let current_value = *values.last()?;
        Some(TrendResult {
            kind: AlertKind::Leak,
            slope: fit.slope,
            average: fit.mean,
            confidence: Confidence::High,
            severity: AlertSeverity::Error,
            message: format!(
                "RAM usage climbing steadily ({:.3} GB/sample over {} samples) with no release; probable leak",
                fit.slope,
                values.len()
            ),
            current_value,
            hours_to_threshold: None,
        })
    }
}

fn metric_series(samples: &[MetricSample], kind: AlertKind) -> Vec<f64> {
    match kind {
        AlertKind::Cpu => samples
            .iter()
            .map(|s| s.cpu.usage_percent as f64)
            .collect(),
        AlertKind::Ram => samples
            .iter()
            .map(|s| s.ram.usage_percent() as f64)
            .collect(),
        AlertKind::Gpu => samples
            .iter()
            .filter_map(|s| s.gpu.as_ref().map(|g| g.usage_percent as f64))
            .collect(),
        AlertKind::Temperature => samples
            .iter()
            .filter_map(|s| s.cpu.temperature_celsius.map(f64::from))
            .collect(),
        AlertKind::Throttled | AlertKind::Leak => Vec::new(),
    }
}
