//! Snapshot provider boundary.
//!
//! The provider is the only place that touches OS/hardware sensor APIs. It
//! returns best-effort raw readings; individual fields may be missing and the
//! collector decides how to fall back. Only a total failure aborts a tick.

use std::time::Instant;

use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::error::Result;
use crate::monitor::sample::GpuSample;
use crate::platform::gpu::get_gpu_provider;

/// Raw per-host readings for one instant.
///
/// `None` means the underlying sensor call failed or the sensor does not
/// exist; the collector substitutes a documented fallback. A `gpu` of `None`
/// specifically means no GPU controller was detected.
#[derive(Debug, Clone, Default)]
pub struct RawSnapshot {
    pub cpu_usage_percent: Option<f32>,
    pub cpu_temperature_celsius: Option<f32>,
    pub core_count: Option<usize>,
    pub ram_used_bytes: Option<u64>,
    pub ram_total_bytes: Option<u64>,
    pub ram_temperature_celsius: Option<f32>,
    pub gpu: Option<GpuSample>,
    pub net_rx_bytes_per_sec: Option<u64>,
    pub net_tx_bytes_per_sec: Option<u64>,
    pub uptime_seconds: u64,
}

/// Source of one point-in-time set of host readings.
///
/// Implementations must return quickly; the collection tick is serialized and
/// a stalled provider causes ticks to be skipped, not queued.
pub trait SnapshotProvider: Send {
    fn snapshot(&mut self) -> Result<RawSnapshot>;
}

/// Trait for GPU metrics providers.
///
/// Implementations live in the platform layer; construction fails when the
/// vendor library or device is absent.
pub trait GpuProvider: Send {
    /// Provider name used for logging (e.g. `"nvml"`).
    fn name(&self) -> &str;

    /// Collect current GPU readings.
    fn collect(&mut self) -> Result<GpuSample>;
}

/// sysinfo-backed provider for the local host.
pub struct SysinfoProvider {
    system: System,
    components: Components,
    networks: Networks,
    gpu_provider: Option<Box<dyn GpuProvider>>,
    last_network_update: Option<Instant>,
    last_network_totals: (u64, u64), // (rx, tx) summed over interfaces
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());

        let mut system = System::new_with_specifics(refresh_kind);
        let components = Components::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();

        // Two refreshes spaced by the minimum interval so the first CPU
        // reading is meaningful.
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_all();

        // GPU controller is optional; absence is not an error.
        let gpu_provider = match get_gpu_provider() {
            Ok(provider) => {
                log::info!("GPU provider initialized: {}", provider.name());
                Some(provider)
            }
            Err(e) => {
                log::debug!("no GPU controller detected: {}", e);
                None
            }
        };

        Self {
            system,
            components,
            networks,
            gpu_provider,
            last_network_update: None,
            last_network_totals: (0, 0),
        }
    }

    fn cpu_temperature(&self) -> Option<f32> {
        component_temperature(&self.components, &["cpu", "core", "tctl", "package"])
    }

    fn ram_temperature(&self) -> Option<f32> {
        component_temperature(&self.components, &["dimm", "mem"])
    }

    fn network_rates(&mut self) -> (Option<u64>, Option<u64>) {
        let now = Instant::now();

        let mut rx_total: u64 = 0;
        let mut tx_total: u64 = 0;
        for (_, data) in self.networks.iter() {
            rx_total = rx_total.saturating_add(data.total_received());
            tx_total = tx_total.saturating_add(data.total_transmitted());
        }

        let rates = match self.last_network_update {
            Some(last) => {
                let elapsed = now.duration_since(last).as_secs_f64();
                if elapsed > 0.0 {
                    let (prev_rx, prev_tx) = self.last_network_totals;
                    let rx = (rx_total.saturating_sub(prev_rx) as f64 / elapsed) as u64;
                    let tx = (tx_total.saturating_sub(prev_tx) as f64 / elapsed) as u64;
                    (Some(rx), Some(tx))
                } else {
                    (None, None)
                }
            }
            // First observation has no baseline to derive a rate from.
            None => (None, None),
        };

        self.last_network_update = Some(now);
        self.last_network_totals = (rx_total, tx_total);
        rates
    }

    fn collect_gpu(&mut self) -> Option<GpuSample> {
        let provider = self.gpu_provider.as_mut()?;
        match provider.collect() {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                log::warn!("GPU collection failed: {}", e);
                None
            }
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProvider for SysinfoProvider {
    fn snapshot(&mut self) -> Result<RawSnapshot> {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);
        self.networks.refresh(true);

        let core_count = self.system.cpus().len();
        let (rx, tx) = self.network_rates();
        let gpu = self.collect_gpu();

        Ok(RawSnapshot {
            cpu_usage_percent: Some(self.system.global_cpu_usage()),
            cpu_temperature_celsius: self.cpu_temperature(),
            core_count: (core_count > 0).then_some(core_count),
            ram_used_bytes: Some(self.system.used_memory()),
            ram_total_bytes: Some(self.system.total_memory()),
            ram_temperature_celsius: self.ram_temperature(),
            gpu,
            net_rx_bytes_per_sec: rx,
            net_tx_bytes_per_sec: tx,
            uptime_seconds: System::uptime(),
        })
    }
}

fn component_temperature(components: &Components, labels: &[&str]) -> Option<f32> {
    components.iter().find_map(|comp| {
        let label = comp.label().to_lowercase();
        if labels.iter().any(|needle| label.contains(needle)) {
            comp.temperature()
        } else {
            None
        }
    })
}
