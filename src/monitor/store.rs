//! Retention-bounded time-series store for metric samples.
//!
//! One writer (the collection tick), many readers (HTTP handlers). Readers
//! get owned snapshots and never block the writer for long; the in-memory
//! series per host is the source of truth between flushes.
//!
//! Durability: physical writes are batched on the flush tick rather than
//! synced per sample, so a hard crash can lose the samples appended since the
//! last flush. That is an accepted trade-off; a clean shutdown always ends
//! with a final flush.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::{HostwatchError, Result};
use crate::monitor::sample::MetricSample;

pub struct MetricStore {
    series: RwLock<HashMap<String, Vec<MetricSample>>>,
    dirty: Mutex<HashSet<String>>,
    dir: PathBuf,
    retention: Duration,
}

impl MetricStore {
    /// Open the store rooted at `<data_dir>/metrics`, loading any persisted
    /// series. A corrupt series file is logged and treated as empty rather
    /// than failing startup.
    pub fn open(data_dir: &std::path::Path, retention: Duration) -> Result<Self> {
        let dir = data_dir.join("metrics");
        fs::create_dir_all(&dir)?;

        let mut series: HashMap<String, Vec<MetricSample>> = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(host_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read(&path) {
                Ok(data) => match serde_json::from_slice::<Vec<MetricSample>>(&data) {
                    Ok(mut samples) => {
                        samples.sort_by_key(|s| s.timestamp);
                        log::info!("loaded {} samples for host {}", samples.len(), host_id);
                        series.insert(host_id.to_string(), samples);
                    }
                    Err(e) => {
                        log::warn!("discarding corrupt series file {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    log::warn!("failed to read series file {:?}: {}", path, e);
                }
            }
        }

        Ok(Self {
            series: RwLock::new(series),
            dirty: Mutex::new(HashSet::new()),
            dir,
            retention,
        })
    }

    /// Append one sample. Never rejects a well-formed sample; eviction of
    /// anything past the retention window piggybacks on the append.
    pub fn append(&self, sample: MetricSample) {
        let host_id = sample.host_id.clone();
        let cutoff = self.cutoff();
        {
            let mut series = self.series.write();
            let samples = series.entry(host_id.clone()).or_default();
            samples.push(sample);
            evict_series(samples, cutoff);
        }
        self.dirty.lock().insert(host_id);
    }

    /// All samples for a host with `timestamp >= since`, ascending. Unknown
    /// hosts yield an empty vec, not an error.
    pub fn query(&self, host_id: &str, since: i64) -> Vec<MetricSample> {
        let series = self.series.read();
        let Some(samples) = series.get(host_id) else {
            return Vec::new();
        };
        let start = samples.partition_point(|s| s.timestamp < since);
        samples[start..].to_vec()
    }

    /// The most recent `count` samples for a host, ascending.
    pub fn recent(&self, host_id: &str, count: usize) -> Vec<MetricSample> {
        let series = self.series.read();
        let Some(samples) = series.get(host_id) else {
            return Vec::new();
        };
        let start = samples.len().saturating_sub(count);
        samples[start..].to_vec()
    }

    /// Latest sample for a host, if any.
    pub fn latest(&self, host_id: &str) -> Option<MetricSample> {
        self.series.read().get(host_id)?.last().cloned()
    }

    pub fn host_ids(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }

    pub fn sample_count(&self, host_id: &str) -> usize {
        self.series.read().get(host_id).map_or(0, |s| s.len())
    }

    /// Drop every sample strictly older than `now - retention` for every
    /// host. Idempotent; a series is never left with a mid-window gap because
    /// the cutoff is a single prefix boundary.
    pub fn evict(&self) {
        let cutoff = self.cutoff();
        let mut series = self.series.write();
        let mut evicted_hosts = Vec::new();
        for (host_id, samples) in series.iter_mut() {
            if evict_series(samples, cutoff) > 0 {
                evicted_hosts.push(host_id.clone());
            }
        }
        drop(series);
        if !evicted_hosts.is_empty() {
            let mut dirty = self.dirty.lock();
            for host_id in evicted_hosts {
                dirty.insert(host_id);
            }
        }
    }

    /// Write every dirty series to disk. Called by the flush tick and once
    /// more on clean shutdown.
    pub fn flush(&self) -> Result<()> {
        let dirty_hosts: Vec<String> = {
            let mut dirty = self.dirty.lock();
            dirty.drain().collect()
        };

        for host_id in dirty_hosts {
            let snapshot = {
                let series = self.series.read();
                series.get(&host_id).cloned().unwrap_or_default()
            };
            let path = self.series_path(&host_id);
            let data = serde_json::to_vec(&snapshot)
                .map_err(|e| HostwatchError::store(format!("serialize {}: {}", host_id, e)))?;
            if let Err(e) = fs::write(&path, data) {
                // Keep the host dirty so the next flush retries.
                self.dirty.lock().insert(host_id.clone());
                return Err(HostwatchError::store(format!(
                    "write {:?}: {}",
                    path, e
                )));
            }
            log::debug!("flushed series for host {}", host_id);
        }
        Ok(())
    }

    fn series_path(&self, host_id: &str) -> PathBuf {
        // Host ids are generated uuids, so they are safe as file stems.
        self.dir.join(format!("{}.json", host_id))
    }

    fn cutoff(&self) -> i64 {
        chrono::Utc::now().timestamp() - self.retention.as_secs() as i64
    }
}

/// Remove the strictly-older-than-cutoff prefix. Returns how many samples
/// were dropped.
fn evict_series(samples: &mut Vec<MetricSample>, cutoff: i64) -> usize {
    let keep_from = samples.partition_point(|s| s.timestamp < cutoff);
    samples.drain(..keep_from).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: i64 = 24 * 3600;

    fn sample(host_id: &str, timestamp: i64, cpu: f32) -> MetricSample {
        MetricSample {
            host_id: host_id.to_string(),
            timestamp,
            cpu: crate::monitor::sample::CpuSample {
                usage_percent: cpu,
                temperature_celsius: Some(51.5),
                core_count: 8,
            },
            ..Default::default()
        }
    }

    #[test]
    fn query_unknown_host_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = MetricStore::open(tmp.path(), Duration::from_secs(3600)).unwrap();
        assert!(store.query("nobody", 0).is_empty());
        assert_eq!(store.latest("nobody"), None);
    }

    #[test]
    fn query_is_ascending_and_since_bounded() {
        let tmp = TempDir::new().unwrap();
        let store = MetricStore::open(tmp.path(), Duration::from_secs(7 * DAY as u64)).unwrap();
        let now = chrono::Utc::now().timestamp();

        for i in 0..10 {
            store.append(sample("h", now - 100 + i * 10, i as f32));
        }

        let all = store.query("h", 0);
        assert_eq!(all.len(), 10);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let tail = store.query("h", now - 40);
        assert_eq!(tail.len(), 4);
        assert!(tail.iter().all(|s| s.timestamp >= now - 40));
    }

    #[test]
    fn retention_keeps_only_recent_window() {
        let tmp = TempDir::new().unwrap();
        let store = MetricStore::open(tmp.path(), Duration::from_secs(7 * DAY as u64)).unwrap();
        let now = chrono::Utc::now().timestamp();

        // Samples spanning the last 10 days, one per day.
        for day in 0..10 {
            store.append(sample("h", now - day * DAY, day as f32));
        }
        store.evict();

        let kept = store.query("h", 0);
        assert_eq!(kept.len(), 7);
        assert!(kept.iter().all(|s| s.timestamp >= now - 7 * DAY));

        // Idempotent.
        store.evict();
        assert_eq!(store.query("h", 0).len(), 7);
    }

    #[test]
    fn flush_and_reload_round_trip() {
        let tmp = TempDir::new().unwrap();
        let now = chrono::Utc::now().timestamp();

        let original = {
            let store = MetricStore::open(tmp.path(), Duration::from_secs(3600)).unwrap();
            let mut s = sample("h", now, 77.25);
            s.gpu = Some(crate::monitor::sample::GpuSample {
                usage_percent: 33.0,
                temperature_celsius: Some(66.0),
                memory_used_bytes: 123_456,
                memory_total_bytes: 8_000_000,
            });
            store.append(s.clone());
            store.append(sample("h", now + 5, 78.0));
            store.flush().unwrap();
            s
        };

        let reloaded = MetricStore::open(tmp.path(), Duration::from_secs(3600)).unwrap();
        let samples = reloaded.query("h", 0);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], original);
    }

    #[test]
    fn corrupt_series_file_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("metrics");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("h.json"), b"not json at all").unwrap();

        let store = MetricStore::open(tmp.path(), Duration::from_secs(3600)).unwrap();
        assert!(store.query("h", 0).is_empty());
    }

    #[test]
    fn recent_returns_tail() {
        let tmp = TempDir::new().unwrap();
        let store = MetricStore::open(tmp.path(), Duration::from_secs(7 * DAY as u64)).unwrap();
        let now = chrono::Utc::now().timestamp();

        for i in 0..30 {
            store.append(sample("h", now - 300 + i * 10, i as f32));
        }

        let window = store.recent("h", 10);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].cpu.usage_percent, 20.0);
        assert_eq!(window[9].cpu.usage_percent, 29.0);

        assert_eq!(store.recent("h", 100).len(), 30);
    }
}
