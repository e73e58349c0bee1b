//! Host identity and liveness.
//!
//! The host id is generated once per installation and reused across
//! restarts. The display name prefers a reverse-DNS answer for the host's
//! primary address and falls back to the OS hostname; it is refreshed on its
//! own timer because DNS can change under a long-lived daemon.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::monitor::sample::HostStatus;

/// Identity and liveness view of one host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRecord {
    pub id: String,
    pub display_name: String,
    pub hostname: String,
    pub os: String,
    pub uptime_seconds: u64,
    pub last_seen: i64,
    pub status: HostStatus,
}

pub struct HostIdentity {
    pub id: String,
    hostname: String,
    os: String,
    display_name: RwLock<String>,
}

impl HostIdentity {
    /// Load the persisted installation id or generate and persist a new one.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let id_path = data_dir.join("host_id");

        let id = match fs::read_to_string(&id_path) {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                fs::write(&id_path, &id)?;
                log::info!("generated new host id {}", id);
                id
            }
        };

        let hostname = local_hostname();
        let os = sysinfo::System::long_os_version()
            .unwrap_or_else(|| std::env::consts::OS.to_string());

        Ok(Self {
            id,
            display_name: RwLock::new(hostname.clone()),
            hostname,
            os,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    /// Re-resolve the display name. Failures leave the previous name in
    /// place; the hostname fallback means there is always something to show.
    pub async fn refresh_display_name(&self) {
        let resolved = reverse_dns_name().await;
        let name = resolved.unwrap_or_else(|| self.hostname.clone());
        let mut current = self.display_name.write();
        if *current != name {
            log::info!("display name changed: {} -> {}", *current, name);
            *current = name;
        }
    }

    pub fn record(&self, status: HostStatus, uptime_seconds: u64, last_seen: i64) -> HostRecord {
        HostRecord {
            id: self.id.clone(),
            display_name: self.display_name(),
            hostname: self.hostname.clone(),
            os: self.os.clone(),
            uptime_seconds,
            last_seen,
            status,
        }
    }
}

/// Demote a derived status to `Offline` once the latest sample is stale.
/// This is a read-time judgement; nothing is stored for it.
pub fn effective_status(
    status: HostStatus,
    last_seen: i64,
    now: i64,
    stale_after: Duration,
) -> HostStatus {
    if now.saturating_sub(last_seen) > stale_after.as_secs() as i64 {
        HostStatus::Offline
    } else {
        status
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string())
}

/// Reverse-DNS the first non-loopback address. Any failure along the way
/// yields `None` and the caller falls back to the hostname.
async fn reverse_dns_name() -> Option<String> {
    let ip = primary_address()?;
    let resolver = match hickory_resolver::TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => resolver,
        Err(e) => {
            log::debug!("no usable DNS resolver: {}", e);
            return None;
        }
    };

    match resolver.reverse_lookup(ip).await {
        Ok(lookup) => lookup
            .iter()
            .next()
            .map(|name| name.to_string().trim_end_matches('.').to_string()),
        Err(e) => {
            log::debug!("reverse lookup for {} failed: {}", ip, e);
            None
        }
    }
}

fn primary_address() -> Option<IpAddr> {
    let interfaces = if_addrs::get_if_addrs().ok()?;
    interfaces
        .iter()
        .find(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn host_id_is_stable_across_restarts() {
        let tmp = TempDir::new().unwrap();

        let first = HostIdentity::load_or_create(tmp.path()).unwrap();
        let second = HostIdentity::load_or_create(tmp.path()).unwrap();
        assert_eq!(first.id, second.id);
        assert!(!first.id.is_empty());
    }

    #[test]
    fn display_name_defaults_to_hostname() {
        let tmp = TempDir::new().unwrap();
        let identity = HostIdentity::load_or_create(tmp.path()).unwrap();
        assert_eq!(identity.display_name(), identity.hostname().to_string());
    }

    #[test]
    fn stale_hosts_read_as_offline() {
        let stale_after = Duration::from_secs(15);

        assert_eq!(
            effective_status(HostStatus::Online, 100, 110, stale_after),
            HostStatus::Online
        );
        assert_eq!(
            effective_status(HostStatus::Throttled, 100, 110, stale_after),
            HostStatus::Throttled
        );
        assert_eq!(
            effective_status(HostStatus::Online, 100, 200, stale_after),
            HostStatus::Offline
        );
    }
}
