//! Tokio runtime plumbing for the monitor.
//!
//! Three independent periodic tasks cooperate through explicitly shared
//! state: the collection tick (sole writer of the stores and latch map), the
//! persistence flush tick, and the host-name refresh tick. Shutdown stops
//! the timers and attempts one final flush.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::error::Result;
use crate::host::HostIdentity;
use crate::monitor::alert_store::AlertStore;
use crate::monitor::alerts::AlertEngine;
use crate::monitor::collector::Collector;
use crate::monitor::notify::{self, Notifier};
use crate::monitor::provider::SnapshotProvider;
use crate::monitor::sample::{HostStatus, MetricSample};

/// Outcome of the most recent collection tick, kept for the read side.
#[derive(Debug, Clone)]
pub struct LatestSnapshot {
    pub sample: MetricSample,
    pub status: HostStatus,
    pub uptime_seconds: u64,
}

/// State shared between the collection tick and the HTTP handlers.
///
/// The collection tick is the only writer; handlers read through short locks
/// and clone out, so an in-flight write never corrupts a response.
pub struct MonitorState {
    pub config: Config,
    pub identity: HostIdentity,
    pub store: crate::monitor::store::MetricStore,
    pub alerts: AlertStore,
    pub latest: RwLock<Option<LatestSnapshot>>,
}

pub type SharedState = Arc<MonitorState>;

impl MonitorState {
    /// Open persistent state and build the shared handle.
    pub fn init(config: Config) -> Result<SharedState> {
        let identity = HostIdentity::load_or_create(&config.data_dir)?;
        let store = crate::monitor::store::MetricStore::open(&config.data_dir, config.retention)?;
        let alerts = AlertStore::open(&config.data_dir, config.retention)?;

        Ok(Arc::new(MonitorState {
            config,
            identity,
            store,
            alerts,
            latest: RwLock::new(None),
        }))
    }

    /// How stale the latest sample may be before the host reads as offline.
    pub fn stale_after(&self) -> Duration {
        self.config.sample_interval.saturating_mul(3).max(Duration::from_secs(15))
    }
}

/// Handle to the spawned monitor tasks.
pub struct MonitorRuntime {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorRuntime {
    /// Spawn the collection, flush, and name-refresh tasks.
    pub fn spawn(state: SharedState, provider: Box<dyn SnapshotProvider>) -> Self {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let collector = Collector::new(state.identity.id.clone());
        let engine = AlertEngine::new(state.config.thresholds);
        let notifiers = Arc::new(notify::build_notifiers(&state.config.notifiers));

        let tasks = vec![
            tokio::spawn(collection_task(
                state.clone(),
                provider,
                collector,
                engine,
                notifiers,
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(flush_task(state.clone(), shutdown_tx.subscribe())),
            tokio::spawn(name_refresh_task(state.clone(), shutdown_tx.subscribe())),
        ];

        Self { shutdown_tx, tasks }
    }

    /// Stop the timers, wait for the tasks, and attempt a final flush.
    pub async fn shutdown(self, state: &MonitorState) {
        log::info!("shutting down monitor tasks");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            let _ = task.await;
        }
        if let Err(e) = state.store.flush() {
            log::error!("final metric flush failed: {}", e);
        }
        if let Err(e) = state.alerts.flush() {
            log::error!("final alert flush failed: {}", e);
        }
    }
}

/// The collection tick. Ticks are serialized by construction: the next
/// collection cannot start while the previous one runs, and missed ticks are
/// skipped rather than queued.
async fn collection_task(
    state: SharedState,
    mut provider: Box<dyn SnapshotProvider>,
    mut collector: Collector,
    mut engine: AlertEngine,
    notifiers: Arc<Vec<Box<dyn Notifier>>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let period = state.config.sample_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!("collection tick started ({:?} cadence)", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();

                let collection = match collector.collect(provider.as_mut()) {
                    Ok(collection) => collection,
                    Err(e) => {
                        // Total provider failure: skip the tick, store nothing.
                        log::warn!("snapshot provider failed, skipping tick: {}", e);
                        continue;
                    }
                };

                state.store.append(collection.sample.clone());

                let host_name = state.identity.display_name();
                let fired = engine.evaluate(&collection.sample, collection.status, &host_name);
                for alert in fired {
                    log::info!("alert fired: {} ({})", alert.subject, alert.body);
                    // Persist first; the latch is already decided, so delivery
                    // happens off the tick and its outcome is irrelevant here.
                    state.alerts.record(alert.clone());
                    let notifiers = notifiers.clone();
                    tokio::spawn(async move {
                        notify::dispatch_all(&notifiers, &alert).await;
                    });
                }

                *state.latest.write() = Some(LatestSnapshot {
                    sample: collection.sample,
                    status: collection.status,
                    uptime_seconds: collection.uptime_seconds,
                });

                let elapsed = started.elapsed();
                if elapsed > period {
                    log::warn!(
                        "collection took {:?} (> {:?} interval); intervening ticks skipped",
                        elapsed,
                        period
                    );
                }
            }
            _ = shutdown.recv() => {
                log::debug!("collection task shutting down");
                break;
            }
        }
    }
}

/// Persistence flush tick. Eviction runs here too so the visible retention
/// bound holds even when appends pause.
async fn flush_task(state: SharedState, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(state.config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.store.evict();
                state.alerts.evict();
                // Write failures stay dirty and are retried next tick.
                if let Err(e) = state.store.flush() {
                    log::error!("metric flush failed: {}", e);
                }
                if let Err(e) = state.alerts.flush() {
                    log::error!("alert flush failed: {}", e);
                }
            }
            _ = shutdown.recv() => {
                log::debug!("flush task shutting down");
                break;
            }
        }
    }
}

/// Host display-name refresh tick.
async fn name_refresh_task(state: SharedState, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(state.config.name_refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The hostname fallback covers startup; the first resolution happens one
    // interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.identity.refresh_display_name().await;
            }
            _ = shutdown.recv() => {
                log::debug!("name refresh task shutting down");
                break;
            }
        }
    }
}
