//! Collection tick: raw snapshot in, derived sample out.
//!
//! The collector never aborts a whole snapshot for a single failed reading.
//! Missing fields fall back to the last known value (zero before any reading
//! succeeded) and the gap is logged. Only a total provider failure skips the
//! tick, and nothing is stored for it.

use crate::error::Result;
use crate::monitor::provider::{RawSnapshot, SnapshotProvider};
use crate::monitor::sample::{
    CpuSample, HostStatus, MetricSample, NetworkSample, PowerEstimate, RamSample,
};

/// Throttle detection constants. These are fixed and intentionally distinct
/// from the configurable alert thresholds.
pub const THROTTLE_CPU_USAGE_PERCENT: f32 = 95.0;
pub const THROTTLE_CPU_TEMP_CELSIUS: f32 = 90.0;

// Per-component power coefficients (watts at full utilization) plus static
// draws for storage and board.
const CPU_MAX_WATTS: f32 = 65.0;
const GPU_MAX_WATTS: f32 = 150.0;
const RAM_MAX_WATTS: f32 = 10.0;
const STORAGE_WATTS: f32 = 8.0;
const BASE_WATTS: f32 = 12.0;

/// Result of one successful collection tick.
#[derive(Debug, Clone)]
pub struct Collection {
    pub sample: MetricSample,
    pub status: HostStatus,
    pub uptime_seconds: u64,
}

/// Produces one [`MetricSample`] per tick for a single host.
///
/// Holds the last successful readings so that per-field provider failures
/// degrade to stale-but-plausible values instead of spikes to zero.
pub struct Collector {
    host_id: String,
    last_cpu_usage: f32,
    last_ram_used: u64,
    last_ram_total: u64,
    last_core_count: usize,
}

impl Collector {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            last_cpu_usage: 0.0,
            last_ram_used: 0,
            last_ram_total: 0,
            last_core_count: 0,
        }
    }

    /// Run one collection. Returns an error only when the provider failed
    /// entirely; the caller logs it and skips the tick.
    pub fn collect(&mut self, provider: &mut dyn SnapshotProvider) -> Result<Collection> {
        let raw = provider.snapshot()?;
        Ok(self.derive(raw, chrono::Utc::now().timestamp()))
    }

    /// Derive a sample from raw readings at the given timestamp. Split from
    /// `collect` so tests can pin the clock.
    pub fn derive(&mut self, raw: RawSnapshot, timestamp: i64) -> Collection {
        let cpu_usage = match raw.cpu_usage_percent {
            Some(v) => {
                self.last_cpu_usage = v;
                v
            }
            None => {
                log::warn!("cpu usage reading missing, using last known value");
                self.last_cpu_usage
            }
        };
        let core_count = match raw.core_count {
            Some(v) => {
                self.last_core_count = v;
                v
            }
            None => self.last_core_count,
        };
        let ram_used = match raw.ram_used_bytes {
            Some(v) => {
                self.last_ram_used = v;
                v
            }
            None => {
                log::warn!("ram usage reading missing, using last known value");
                self.last_ram_used
            }
        };
        let ram_total = match raw.ram_total_bytes {
            Some(v) => {
                self.last_ram_total = v;
                v
            }
            None => self.last_ram_total,
        };

        let cpu = CpuSample {
            usage_percent: cpu_usage,
            temperature_celsius: raw.cpu_temperature_celsius,
            core_count,
        };
        let ram = RamSample {
            used_bytes: ram_used,
            total_bytes: ram_total,
            temperature_celsius: raw.ram_temperature_celsius,
        };
        let network = NetworkSample {
            rx_bytes_per_sec: raw.net_rx_bytes_per_sec.unwrap_or(0),
            tx_bytes_per_sec: raw.net_tx_bytes_per_sec.unwrap_or(0),
        };

        let gpu_usage_frac = raw
            .gpu
            .as_ref()
            .map(|g| g.usage_percent / 100.0)
            .unwrap_or(0.0);
        let power = estimate_power(cpu.usage_percent / 100.0, gpu_usage_frac, &ram);

        let sample = MetricSample {
            host_id: self.host_id.clone(),
            timestamp,
            cpu,
            ram,
            gpu: raw.gpu,
            power,
            network,
        };
        let status = derive_status(&sample);

        Collection {
            sample,
            status,
            uptime_seconds: raw.uptime_seconds,
        }
    }
}

/// `Throttled` when either throttle detection bound is exceeded, else
/// `Online`. `Offline` is a liveness judgement made at read time, never here.
pub fn derive_status(sample: &MetricSample) -> HostStatus {
    let hot = sample
        .cpu
        .temperature_celsius
        .is_some_and(|t| t > THROTTLE_CPU_TEMP_CELSIUS);
    if sample.cpu.usage_percent > THROTTLE_CPU_USAGE_PERCENT || hot {
        HostStatus::Throttled
    } else {
        HostStatus::Online
    }
}

/// Deterministic power estimate from usage fractions and fixed coefficients.
pub fn estimate_power(cpu_frac: f32, gpu_frac: f32, ram: &RamSample) -> PowerEstimate {
    let ram_frac = ram.usage_percent() / 100.0;

    let cpu_watts = cpu_frac.clamp(0.0, 1.0) * CPU_MAX_WATTS;
    let gpu_watts = gpu_frac.clamp(0.0, 1.0) * GPU_MAX_WATTS;
    let ram_watts = ram_frac.clamp(0.0, 1.0) * RAM_MAX_WATTS;

    PowerEstimate {
        total_watts: cpu_watts + gpu_watts + ram_watts + STORAGE_WATTS + BASE_WATTS,
        cpu_watts,
        gpu_watts,
        ram_watts,
        storage_watts: STORAGE_WATTS,
        base_watts: BASE_WATTS,
    }
}
