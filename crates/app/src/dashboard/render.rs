//! Render worker: keeps one heatmap renderer attached for the lifetime of a
//! pipeline run and republishes the PNG whenever the store changes.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use backend_client::{BackendClient, PollEvent, SequenceClock, poll_once};
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use heatmap::{BackgroundSource, DrawReport, HeatmapRenderer, ZoneLayout};
use tracing::{debug, info, warn};
use zone_store::SnapshotStore;

use crate::dashboard::{
    data::{HeatmapFrame, SharedFrame, SharedStore},
    telemetry::spawn_thread,
    watchdog::{HealthComponent, PipelineHealth},
};

const RENDER_RECV_TIMEOUT: Duration = Duration::from_millis(250);
const BACKGROUND_WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub(crate) struct RenderSettings {
    pub(crate) layout: Arc<ZoneLayout>,
    pub(crate) background: Option<PathBuf>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Renderer plus the shared state it reads from and publishes to.
pub(crate) struct RenderLoop {
    renderer: HeatmapRenderer,
    store: SharedStore,
    frame: SharedFrame,
    store_revision: u64,
}

impl RenderLoop {
    pub(crate) fn new(settings: &RenderSettings, store: SharedStore, frame: SharedFrame) -> Self {
        let mut renderer = HeatmapRenderer::new(settings.width, settings.height);
        if let Some(path) = &settings.background {
            renderer.load_background(BackgroundSource::Path(path.clone()));
        }
        let mut this = Self {
            renderer,
            store,
            frame,
            store_revision: 0,
        };
        let started = Instant::now();
        if let Some(report) = this.renderer.set_layout(settings.layout.as_ref().clone()) {
            this.publish(report, started);
        }
        this
    }

    /// Pull the current zones out of the store and redraw if they changed.
    pub(crate) fn refresh(&mut self) -> Option<DrawReport> {
        let (zones, revision) = match self.store.lock() {
            Ok(store) => (store.zones().to_vec(), store.revision()),
            Err(_) => {
                warn!("Store lock poisoned; skipping redraw");
                return None;
            }
        };
        self.store_revision = revision;
        let started = Instant::now();
        let report = self.renderer.set_zones(&zones)?;
        self.publish(report.clone(), started);
        Some(report)
    }

    /// Install a finished background decode, redrawing with current data.
    pub(crate) fn poll_background(&mut self) -> Option<DrawReport> {
        let started = Instant::now();
        let report = self.renderer.poll_background()?;
        info!("Background image applied");
        self.publish(report.clone(), started);
        Some(report)
    }

    pub(crate) fn detach(&mut self) {
        self.renderer.detach();
    }

    fn publish(&mut self, report: DrawReport, started: Instant) {
        let _span = tracing::info_span!(
            "render.publish",
            frame = self.renderer.frames_drawn(),
            polygons = report.polygons
        )
        .entered();
        let png = match self.renderer.encode_png() {
            Ok(png) => png,
            Err(err) => {
                warn!("{err}");
                return;
            }
        };
        metrics::histogram!("stadium_render_seconds").record(started.elapsed().as_secs_f64());
        debug!(
            zones = report.zones_drawn(),
            markers = report.markers_drawn,
            bytes = png.len(),
            "heatmap published"
        );
        let packet = HeatmapFrame {
            png,
            frame_number: self.renderer.frames_drawn(),
            store_revision: self.store_revision,
            rendered_at: Utc::now(),
            report,
        };
        match self.frame.lock() {
            Ok(mut guard) => *guard = Some(packet),
            Err(_) => warn!("Frame lock poisoned; dropping heatmap"),
        }
    }
}

pub(crate) fn spawn_render_worker(
    settings: RenderSettings,
    store: SharedStore,
    frame: SharedFrame,
    triggers: Receiver<()>,
    health: Arc<PipelineHealth>,
    running: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    spawn_thread("stadium-render", move || {
        let mut render = RenderLoop::new(&settings, store, frame);
        render.refresh();
        while running.load(Ordering::Relaxed) {
            health.beat(HealthComponent::Renderer);
            match triggers.recv_timeout(RENDER_RECV_TIMEOUT) {
                Ok(()) => {
                    render.refresh();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            render.poll_background();
        }
        render.detach();
        debug!("render worker stopped");
    })
}

/// Fetch once, draw once, write the PNG to `output`.
pub(crate) fn render_snapshot(
    client: &BackendClient,
    settings: &RenderSettings,
    output: &Path,
) -> Result<DrawReport> {
    let clock = SequenceClock::new();
    let mut store = SnapshotStore::new(clock.clone());
    let event = poll_once(client, &clock);
    if let PollEvent::Failed { message, .. } = &event {
        bail!("Backend unavailable at {}: {message}", client.base_url());
    }
    store.apply_poll(&event);

    let mut renderer = HeatmapRenderer::new(settings.width, settings.height);
    renderer.set_layout(settings.layout.as_ref().clone());
    renderer.set_zones(store.zones());
    if let Some(path) = &settings.background {
        renderer.load_background(BackgroundSource::Path(path.clone()));
        if renderer.wait_background(BACKGROUND_WAIT).is_none() {
            warn!("Background {} not applied", path.display());
        }
    }
    let report = renderer
        .redraw()
        .context("Renderer produced no frame")?;
    let png = renderer.encode_png()?;
    fs::write(output, png).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(report)
}
