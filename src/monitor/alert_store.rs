//! Append-only audit log of emitted alerts.
//!
//! Individual alerts are never updated or deleted; the only removal is the
//! bulk retention eviction shared with the metric store. Writes batch on the
//! flush tick with a final flush on clean shutdown.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::{HostwatchError, Result};
use crate::monitor::alerts::Alert;

pub struct AlertStore {
    alerts: RwLock<Vec<Alert>>, // append order = time order
    dirty: AtomicBool,
    path: PathBuf,
    retention: Duration,
}

impl AlertStore {
    /// Open the audit log at `<data_dir>/alerts.json`. A corrupt file is
    /// logged and treated as empty.
    pub fn open(data_dir: &std::path::Path, retention: Duration) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join("alerts.json");

        let alerts = if path.exists() {
            match fs::read(&path) {
                Ok(data) => match serde_json::from_slice::<Vec<Alert>>(&data) {
                    Ok(mut alerts) => {
                        alerts.sort_by_key(|a| a.timestamp);
                        log::info!("loaded {} persisted alerts", alerts.len());
                        alerts
                    }
                    Err(e) => {
                        log::warn!("discarding corrupt alert log {:?}: {}", path, e);
                        Vec::new()
                    }
                },
                Err(e) => {
                    log::warn!("failed to read alert log {:?}: {}", path, e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            alerts: RwLock::new(alerts),
            dirty: AtomicBool::new(false),
            path,
            retention,
        })
    }

    pub fn record(&self, alert: Alert) {
        self.alerts.write().push(alert);
        self.dirty.store(true, Ordering::Release);
    }

    /// Most-recent-first, optionally filtered by host, bounded by `limit`.
    pub fn query(&self, host_id: Option<&str>, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.read();
        alerts
            .iter()
            .rev()
            .filter(|a| host_id.is_none_or(|h| a.host_id == h))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self, host_id: Option<&str>) -> usize {
        let alerts = self.alerts.read();
        match host_id {
            Some(h) => alerts.iter().filter(|a| a.host_id == h).count(),
            None => alerts.len(),
        }
    }

    /// Drop alerts strictly older than the retention cutoff.
    pub fn evict(&self) {
        let cutoff = chrono::Utc::now().timestamp() - self.retention.as_secs() as i64;
        let mut alerts = self.alerts.write();
        let keep_from = alerts.partition_point(|a| a.timestamp < cutoff);
        if keep_from > 0 {
            alerts.drain(..keep_from);
            self.dirty.store(true, Ordering::Release);
        }
    }

    pub fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let snapshot = self.alerts.read().clone();
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| HostwatchError::store(format!("serialize alert log: {}", e)))?;
        if let Err(e) = fs::write(&self.path, data) {
            self.dirty.store(true, Ordering::Release);
            return Err(HostwatchError::store(format!(
                "write {:?}: {}",
                self.path, e
            )));
        }
        log::debug!("flushed {} alerts", snapshot.len());
        Ok(())
    }
}
