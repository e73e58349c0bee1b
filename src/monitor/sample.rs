use serde::{Deserialize, Serialize};

/// One snapshot of host resources at one instant.
///
/// Samples are immutable once appended to the store; retention eviction is
/// the only thing that removes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub host_id: String,
    pub timestamp: i64, // Unix timestamp
    pub cpu: CpuSample,
    pub ram: RamSample,
    pub gpu: Option<GpuSample>,
    pub power: PowerEstimate,
    pub network: NetworkSample,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuSample {
    pub usage_percent: f32,
    pub temperature_celsius: Option<f32>,
    pub core_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RamSample {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub temperature_celsius: Option<f32>,
}

impl RamSample {
    pub fn usage_percent(&self) -> f32 {
        if self.total_bytes > 0 {
            (self.used_bytes as f32 / self.total_bytes as f32) * 100.0
        } else {
            0.0
        }
    }

    pub fn used_gb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Absent when the host has no detectable GPU controller. Consumers must
/// treat `None` as "no GPU", not as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GpuSample {
    pub usage_percent: f32,
    pub temperature_celsius: Option<f32>,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

impl GpuSample {
    pub fn memory_percent(&self) -> f32 {
        if self.memory_total_bytes > 0 {
            (self.memory_used_bytes as f32 / self.memory_total_bytes as f32) * 100.0
        } else {
            0.0
        }
    }
}

/// Informational power draw estimate derived from usage fractions and fixed
/// per-component coefficients. Never alert-bearing on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PowerEstimate {
    pub total_watts: f32,
    pub cpu_watts: f32,
    pub gpu_watts: f32,
    pub ram_watts: f32,
    pub storage_watts: f32,
    pub base_watts: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkSample {
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
}

/// Liveness status, derived from the latest sample and never stored on its
/// own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    #[default]
    Online,
    Offline,
    Throttled,
}
