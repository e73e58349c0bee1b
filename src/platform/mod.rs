//! Platform-specific code.
//!
//! Vendor GPU libraries live here, behind the [`crate::monitor::provider::GpuProvider`]
//! trait so the rest of the crate never touches them directly.

pub mod gpu;
