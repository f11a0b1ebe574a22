//! Dashboard supervisor tying together the poller, the sync and render
//! workers, the watchdog, and the HTTP server.
//!
//! The store and layout live in an `AppContext` that outlives pipeline
//! restarts, so a stalled worker never costs the last good snapshot.

use std::{
    sync::{
        Arc, Mutex, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use backend_client::{POLL_INTERVAL, Poller};
use tracing::{debug, error, info, warn};

use crate::dashboard::{
    DashboardConfig,
    context::AppContext,
    control::ControlPlane,
    data::{RenderTrigger, SharedFrame},
    render::{RenderSettings, spawn_render_worker},
    server::{ServerState, spawn_dashboard_server},
    sync::spawn_sync_worker,
    telemetry,
    watchdog::{PipelineHealth, WatchdogState, spawn_watchdog},
};

const SUPERVISOR_TICK: Duration = Duration::from_millis(100);
const RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Run the dashboard until Ctrl+C, restarting workers when the watchdog
/// reports a stall.
pub fn run(config: DashboardConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry, config.verbose);
    if let Err(err) = telemetry::init_metrics_recorder() {
        warn!("{err:#}; /metrics will be unavailable");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler({
            let handler_shutdown = handler_shutdown.clone();
            move || {
                handler_shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let context = AppContext::create(config).context("Failed to create dashboard context")?;
    let frame: SharedFrame = Arc::new(Mutex::new(None));

    let mut attempt: u32 = 0;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match run_pipeline_once(&context, &frame, shutdown.clone()) {
            Ok(PipelineOutcome::Graceful) => break,
            Ok(PipelineOutcome::Restart(reason)) => {
                attempt = attempt.saturating_add(1);
                warn!("Watchdog requested restart (reason: {reason}), attempt #{attempt}");
                thread::sleep(RESTART_BACKOFF);
            }
            Err(err) => {
                error!("Dashboard pipeline error: {err:?}");
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                attempt = attempt.saturating_add(1);
                thread::sleep(RESTART_BACKOFF);
            }
        }
    }

    context.dispose();
    Ok(())
}

/// Result of a single pipeline run attempt.
enum PipelineOutcome {
    Graceful,
    Restart(&'static str),
}

/// Worker threads of one run. Dropping the set stops and joins them, so a
/// failed start never leaves a half-built pipeline behind.
struct Workers {
    running: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Workers {
    fn new(running: Arc<AtomicBool>) -> Self {
        Self {
            running,
            handles: Vec::new(),
        }
    }

    fn push(&mut self, handle: thread::JoinHandle<()>) {
        self.handles.push(handle);
    }

    fn join_all(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.join_all();
    }
}

fn run_pipeline_once(
    context: &AppContext,
    frame: &SharedFrame,
    shutdown: Arc<AtomicBool>,
) -> Result<PipelineOutcome> {
    let config = &context.config;
    let pipeline_span = tracing::info_span!(
        "dashboard.pipeline",
        backend = %config.backend_url,
        width = config.canvas_width,
        height = config.canvas_height,
        polygons = context.layout.len(),
        poll_ms = POLL_INTERVAL.as_millis() as u64
    );
    let _pipeline_span_guard = pipeline_span.enter();

    let health = Arc::new(PipelineHealth::new());
    let running = Arc::new(AtomicBool::new(true));
    let watchdog_state = Arc::new(WatchdogState::new());

    let (render_tx, render_rx) = crossbeam_channel::bounded::<()>(1);
    let render_trigger = RenderTrigger::new(render_tx);
    let (event_tx, event_rx) = crossbeam_channel::unbounded();

    let mut workers = Workers::new(running.clone());
    workers.push(spawn_render_worker(
        RenderSettings {
            layout: context.layout.clone(),
            background: config.background.clone(),
            width: config.canvas_width,
            height: config.canvas_height,
        },
        context.store.clone(),
        frame.clone(),
        render_rx,
        health.clone(),
        running.clone(),
    )
    .context("Failed to spawn render worker")?);

    let poller = Poller::spawn(
        context.client.clone(),
        context.clock.clone(),
        POLL_INTERVAL,
        event_tx,
    )
    .context("Failed to start backend poller")?;

    workers.push(spawn_sync_worker(
        context.store.clone(),
        event_rx,
        poller.token(),
        render_trigger.clone(),
        health.clone(),
        running.clone(),
        config.verbose,
    )
    .context("Failed to spawn sync worker")?);

    workers.push(spawn_watchdog(
        health,
        context.store.clone(),
        running.clone(),
        shutdown.clone(),
        watchdog_state.clone(),
    )
    .context("Failed to spawn watchdog")?);

    let server = spawn_dashboard_server(
        ServerState {
            store: context.store.clone(),
            frame: frame.clone(),
            layout: context.layout.clone(),
            control: ControlPlane::new(
                context.client.clone(),
                context.clock.clone(),
                context.store.clone(),
                Some(render_trigger),
            ),
            video_feed_url: context.client.video_feed_url(),
            metrics: telemetry::prometheus_handle(),
        },
        (config.bind_host.clone(), config.bind_port),
    )
    .context("Failed to start dashboard server")?;

    info!(
        "Dashboard available at http://127.0.0.1:{}/ (heatmap at /heatmap.png, state at /state)",
        config.bind_port
    );
    debug!("Polling {} every {} ms", config.backend_url, POLL_INTERVAL.as_millis());

    while running.load(Ordering::Relaxed) {
        if shutdown.load(Ordering::Relaxed) {
            running.store(false, Ordering::SeqCst);
            break;
        }
        thread::sleep(SUPERVISOR_TICK);
    }

    info!("Stopping dashboard pipeline");
    poller.stop();
    workers.join_all();
    server.stop();

    if watchdog_state.is_triggered() {
        let reason = watchdog_state
            .reason()
            .map(|component| component.label())
            .unwrap_or("watchdog");
        return Ok(PipelineOutcome::Restart(reason));
    }

    Ok(PipelineOutcome::Graceful)
}
