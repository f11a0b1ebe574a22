//! Single writer that folds poll completions into the snapshot store.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use backend_client::{CancellationToken, PollEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};
use zone_store::ApplyOutcome;

use crate::dashboard::{
    data::{RenderTrigger, SharedStore},
    telemetry::spawn_thread,
    watchdog::{HealthComponent, PipelineHealth},
};

const SYNC_RECV_TIMEOUT: Duration = Duration::from_millis(250);

pub(crate) fn spawn_sync_worker(
    store: SharedStore,
    events: Receiver<PollEvent>,
    token: CancellationToken,
    render: RenderTrigger,
    health: Arc<PipelineHealth>,
    running: Arc<AtomicBool>,
    verbose: bool,
) -> std::io::Result<thread::JoinHandle<()>> {
    spawn_thread("stadium-sync", move || {
        while running.load(Ordering::Relaxed) {
            health.beat(HealthComponent::Sync);
            let event = match events.recv_timeout(SYNC_RECV_TIMEOUT) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if token.is_cancelled() {
                debug!(seq = event.seq(), "poller cancelled; dropping completion");
                break;
            }
            if apply_event(&store, &event, verbose) == Some(ApplyOutcome::Applied) {
                render.fire();
            }
        }
        debug!("sync worker stopped");
    })
}

/// Apply one completion and record its metrics. `None` if the store lock is
/// poisoned.
pub(crate) fn apply_event(
    store: &SharedStore,
    event: &PollEvent,
    verbose: bool,
) -> Option<ApplyOutcome> {
    let seq = event.seq();
    let _span = tracing::info_span!("sync.apply", seq).entered();

    let mut store = match store.lock() {
        Ok(store) => store,
        Err(_) => {
            warn!("Store lock poisoned; dropping poll #{seq}");
            return None;
        }
    };
    let outcome = store.apply_poll(event);
    if outcome == ApplyOutcome::Stale {
        metrics::counter!("stadium_stale_responses_total").increment(1);
        return Some(outcome);
    }

    metrics::histogram!("stadium_poll_seconds").record(event.elapsed().as_secs_f64());
    match event {
        PollEvent::Snapshot { snapshot, .. } => {
            metrics::counter!("stadium_polls_total", "outcome" => "ok").increment(1);
            metrics::gauge!("stadium_zone_count").set(store.zones().len() as f64);
            if verbose {
                info!(
                    "Poll #{seq}: {} zones, total {} ({})",
                    snapshot.zones.len(),
                    snapshot.total_count,
                    snapshot.global_status
                );
            }
        }
        PollEvent::Failed { kind, message, .. } => {
            metrics::counter!("stadium_polls_total", "outcome" => *kind).increment(1);
            warn!("Poll #{seq} failed: {message}");
        }
    }
    Some(outcome)
}
