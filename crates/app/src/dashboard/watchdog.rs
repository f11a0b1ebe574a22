use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use backend_client::POLL_INTERVAL;
use chrono::{DateTime, Utc};
use tracing::{error, warn};
use zone_store::ConnectivityState;

use crate::dashboard::{data::SharedStore, telemetry::spawn_thread};

pub(crate) const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const WATCHDOG_STALE_THRESHOLD_MS: u64 = 3_000;
pub(crate) const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;
/// Backend data older than this is reported even if no poll has failed.
pub(crate) const DATA_STALE_AFTER_MS: i64 = POLL_INTERVAL.as_millis() as i64 * 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum HealthComponent {
    Sync,
    Renderer,
}

impl HealthComponent {
    pub(crate) fn label(self) -> &'static str {
        match self {
            HealthComponent::Sync => "sync",
            HealthComponent::Renderer => "renderer",
        }
    }
}

/// Last heartbeat of each worker, in unix millis.
pub(crate) struct PipelineHealth {
    sync: AtomicU64,
    renderer: AtomicU64,
}

impl PipelineHealth {
    pub(crate) fn new() -> Self {
        let now = current_millis();
        let grace_deadline = now.saturating_add(WATCHDOG_STARTUP_GRACE_MS);
        Self {
            sync: AtomicU64::new(grace_deadline),
            renderer: AtomicU64::new(grace_deadline),
        }
    }

    pub(crate) fn beat(&self, component: HealthComponent) {
        self.beat_at(component, current_millis());
    }

    fn beat_at(&self, component: HealthComponent, now: u64) {
        match component {
            HealthComponent::Sync => self.sync.store(now, Ordering::Relaxed),
            HealthComponent::Renderer => self.renderer.store(now, Ordering::Relaxed),
        }
    }

    pub(crate) fn stale_component(&self, now: u64) -> Option<HealthComponent> {
        if now.saturating_sub(self.sync.load(Ordering::Relaxed)) > WATCHDOG_STALE_THRESHOLD_MS {
            return Some(HealthComponent::Sync);
        }
        if now.saturating_sub(self.renderer.load(Ordering::Relaxed)) > WATCHDOG_STALE_THRESHOLD_MS
        {
            return Some(HealthComponent::Renderer);
        }
        None
    }
}

pub(crate) struct WatchdogState {
    triggered: AtomicBool,
    reason: Mutex<Option<HealthComponent>>,
}

impl WatchdogState {
    pub(crate) fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            reason: Mutex::new(None),
        }
    }

    pub(crate) fn arm(&self, component: HealthComponent) {
        if let Ok(mut guard) = self.reason.lock() {
            *guard = Some(component);
        }
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub(crate) fn reason(&self) -> Option<HealthComponent> {
        match self.reason.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        }
    }
}

/// Milliseconds the store has looked connected without a fresh merge, once
/// that exceeds `threshold_ms`. Links already reported as failed are left
/// alone so the poll error message is kept.
pub(crate) fn silent_staleness(
    connectivity: &ConnectivityState,
    now: DateTime<Utc>,
    threshold_ms: i64,
) -> Option<i64> {
    if !connectivity.connected {
        return None;
    }
    connectivity
        .staleness_ms(now)
        .filter(|stale| *stale > threshold_ms)
}

pub(crate) fn spawn_watchdog(
    health: Arc<PipelineHealth>,
    store: SharedStore,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    state: Arc<WatchdogState>,
) -> std::io::Result<thread::JoinHandle<()>> {
    spawn_thread("stadium-watchdog", move || {
        while running.load(Ordering::Relaxed) && !shutdown.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));

            check_data_freshness(&store);

            if let Some(component) = health.stale_component(current_millis()) {
                error!(
                    "Watchdog detected stalled {} worker; requesting pipeline restart",
                    component.label()
                );
                state.arm(component);
                running.store(false, Ordering::SeqCst);
                break;
            }
        }
    })
}

fn check_data_freshness(store: &SharedStore) {
    let Ok(mut store) = store.lock() else {
        warn!("Store lock poisoned; skipping freshness check");
        return;
    };
    if let Some(stale_ms) = silent_staleness(store.connectivity(), Utc::now(), DATA_STALE_AFTER_MS)
    {
        warn!("No backend data for {stale_ms} ms; marking link stale");
        metrics::counter!("stadium_data_stale_total").increment(1);
        store.report_error(format!("Backend data stale for {} s", stale_ms / 1000));
    } else if store.connectivity().connected {
        metrics::gauge!("stadium_data_age_seconds").set(
            store
                .connectivity()
                .staleness_ms(Utc::now())
                .unwrap_or_default() as f64
                / 1000.0,
        );
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
