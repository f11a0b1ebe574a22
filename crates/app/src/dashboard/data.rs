use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, TrySendError};
use heatmap::DrawReport;
use serde::{Deserialize, Serialize};
use zone_store::{SnapshotStore, ZoneViewModel};

/// Latest rendered heatmap.
#[derive(Clone)]
pub(crate) struct HeatmapFrame {
    pub(crate) png: Vec<u8>,
    pub(crate) frame_number: u64,
    pub(crate) store_revision: u64,
    pub(crate) rendered_at: DateTime<Utc>,
    pub(crate) report: DrawReport,
}

pub(crate) type SharedFrame = Arc<Mutex<Option<HeatmapFrame>>>;
pub(crate) type SharedStore = Arc<Mutex<SnapshotStore>>;

/// Wakes the render worker. Triggers coalesce: one pending wake-up is enough
/// because every redraw reads the store as it is at draw time.
#[derive(Clone)]
pub(crate) struct RenderTrigger(Sender<()>);

impl RenderTrigger {
    pub(crate) fn new(tx: Sender<()>) -> Self {
        Self(tx)
    }

    pub(crate) fn fire(&self) {
        match self.0.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("render worker gone; dropping redraw request");
            }
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct PriceRequest {
    pub(crate) price: f64,
}

#[derive(Serialize)]
pub(crate) struct OverrideResponse {
    pub(crate) zone: String,
    pub(crate) mode: &'static str,
    /// `false` when the backend accepted the command but the zone is not in
    /// the current snapshot, so nothing changed locally.
    pub(crate) applied: bool,
    pub(crate) view: Option<ZoneViewModel>,
}

#[derive(Serialize)]
pub(crate) struct FrameInfo<'a> {
    pub(crate) frame_number: u64,
    pub(crate) store_revision: u64,
    pub(crate) rendered_at: DateTime<Utc>,
    pub(crate) report: &'a DrawReport,
}

impl HeatmapFrame {
    pub(crate) fn info(&self) -> FrameInfo<'_> {
        FrameInfo {
            frame_number: self.frame_number,
            store_revision: self.store_revision,
            rendered_at: self.rendered_at,
            report: &self.report,
        }
    }
}
