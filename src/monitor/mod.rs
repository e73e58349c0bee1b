//! Monitoring core.
//!
//! Everything that samples, stores, evaluates, and predicts lives here; the
//! HTTP layer and the CLI are thin consumers of these types.

pub mod alert_store;
pub mod alerts;
pub mod collector;
pub mod notify;
pub mod provider;
pub mod runtime;
pub mod sample;
pub mod store;
pub mod trend;

pub use alert_store::AlertStore;
pub use alerts::{Alert, AlertEngine, AlertKind, AlertSeverity};
pub use collector::{Collection, Collector};
pub use notify::{build_notifiers, dispatch_all, Notifier};
pub use provider::{GpuProvider, RawSnapshot, SnapshotProvider, SysinfoProvider};
pub use runtime::{MonitorRuntime, MonitorState, SharedState};
pub use sample::{
    CpuSample, GpuSample, HostStatus, MetricSample, NetworkSample, PowerEstimate, RamSample,
};
pub use store::MetricStore;
pub use trend::{Confidence, TrendAnalyzer, TrendResult, MIN_TREND_SAMPLES, TREND_WINDOW};
