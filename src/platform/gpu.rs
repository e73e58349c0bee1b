//! GPU metrics via NVML.
//!
//! Absence of the library, the device, or the feature flag means "no GPU
//! controller", which downstream consumers treat as a normal state.

#[cfg(feature = "nvml")]
use nvml_wrapper::{enum_wrappers::device::TemperatureSensor, Device, Nvml};

use crate::error::{HostwatchError, Result};
use crate::monitor::provider::GpuProvider;
use crate::monitor::sample::GpuSample;

/// NVIDIA GPU provider using NVML
pub struct NvmlGpuProvider {
    #[cfg(feature = "nvml")]
    nvml: Nvml,
    device_index: u32,
}

impl NvmlGpuProvider {
    /// Initialize NVML and select the first available GPU.
    pub fn new() -> Result<Self> {
        Self::with_device_index(0)
    }

    /// Create a provider for a specific GPU index.
    pub fn with_device_index(index: u32) -> Result<Self> {
        #[cfg(feature = "nvml")]
        {
            let nvml = Nvml::init().map_err(|e| {
                HostwatchError::gpu_not_available(format!("Failed to init NVML: {}", e))
            })?;

            // Verify device exists
            let _ = nvml.device_by_index(index).map_err(|e| {
                HostwatchError::gpu_not_available(format!("GPU {} not found: {}", index, e))
            })?;

            Ok(Self {
                nvml,
                device_index: index,
            })
        }
        #[cfg(not(feature = "nvml"))]
        {
            let _ = index;
            Err(HostwatchError::gpu_not_available(
                "NVIDIA GPU support not enabled",
            ))
        }
    }

    #[cfg(feature = "nvml")]
    fn get_device(&self) -> Result<Device<'_>> {
        self.nvml.device_by_index(self.device_index).map_err(|e| {
            HostwatchError::provider(format!("Failed to get GPU device: {}", e))
        })
    }
}

impl GpuProvider for NvmlGpuProvider {
    fn name(&self) -> &str {
        "nvml"
    }

    fn collect(&mut self) -> Result<GpuSample> {
        #[cfg(feature = "nvml")]
        {
            let device = self.get_device()?;

            let utilization = device.utilization_rates().map(|u| u.gpu).unwrap_or(0);
            let memory_info = device.memory_info().map_err(|e| {
                HostwatchError::provider(format!("Failed to get memory info: {}", e))
            })?;
            let temperature = device.temperature(TemperatureSensor::Gpu).ok();

            Ok(GpuSample {
                usage_percent: utilization as f32,
                temperature_celsius: temperature.map(|t| t as f32),
                memory_used_bytes: memory_info.used,
                memory_total_bytes: memory_info.total,
            })
        }
        #[cfg(not(feature = "nvml"))]
        {
            Err(HostwatchError::gpu_not_available(
                "NVIDIA GPU support not enabled",
            ))
        }
    }
}

/// Attempt to get an available GPU provider.
///
/// Returns an error when no supported GPU is present; callers treat that as
/// "host has no GPU", not a fault.
pub fn get_gpu_provider() -> Result<Box<dyn GpuProvider>> {
    let provider = NvmlGpuProvider::new()?;
    Ok(Box::new(provider))
}
