//! Crowd-density heatmap renderer.
//!
//! A renderer instance owns one drawing surface, the normalized layout it was
//! activated with, and the last zone list it was given. Any change to the zone
//! list, the layout, or the derived maximum count triggers a full
//! clear-and-redraw; nothing is patched incrementally.
//!
//! Layout polygons and live zones come from different sources. Each polygon is
//! matched to a zone by name when the layout carries one, otherwise by index.
//! Polygons without zone data are still shaded using defaults (no occupancy,
//! `SAFE`); labels are only drawn for polygons that have zone data.

use std::{io::Cursor, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::Serialize;
use tracing::{debug, warn};
use zone_store::{ZoneStatus, ZoneViewModel};

use crate::{
    background::{BackgroundLoaded, BackgroundSource, FittedBackground, ImageRect, fit, spawn_decode},
    canvas::{RadialStops, blank, draw_image, fill_polygon_radial, to_rgba},
    error::RenderError,
    layout::ZoneLayout,
    overlay::{draw_centered_text, draw_grid},
};

/// Floor applied to every zone's intensity so quiet zones stay visible.
pub const MIN_INTENSITY: f64 = 0.15;
/// Spacing of the reference grid in pixels.
pub const GRID_SPACING: u32 = 50;
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;

const CLEAR_RGB: [u8; 3] = [241, 245, 249];
const CLEAR_COLOR: Rgba<u8> = Rgba([CLEAR_RGB[0], CLEAR_RGB[1], CLEAR_RGB[2], 255]);
const BACKGROUND_ALPHA: f32 = 0.6;
const LABEL_COLOR: Rgba<u8> = Rgba([15, 23, 42, 255]);
/// Sky blue at 10% opacity.
const GRID_COLOR: Rgba<u8> = Rgba([56, 189, 248, 26]);
const SAFE_COLOR: [u8; 3] = [22, 163, 74];
const WARNING_COLOR: [u8; 3] = [234, 88, 12];
const CRITICAL_COLOR: [u8; 3] = [220, 38, 38];
const BASE_SPREAD: f64 = 40.0;
const SPREAD_PER_INTENSITY: f64 = 120.0;
const MID_STOP: f32 = 0.45;

/// `max(0.15, count / max_count)`. Because `max_count` is the largest count of
/// the same zone list, the result never exceeds 1.
pub fn zone_intensity(count: u64, max_count: u64) -> f64 {
    let ratio = count as f64 / max_count.max(1) as f64;
    ratio.max(MIN_INTENSITY)
}

/// Largest occupancy in `zones`, at least 1.
pub fn max_count(zones: &[ZoneViewModel]) -> u64 {
    zones.iter().map(|zone| zone.count).max().unwrap_or(0).max(1)
}

/// CRITICAL wins over WARNING, which wins over the default colour.
pub fn status_color(status: ZoneStatus) -> [u8; 3] {
    match status {
        ZoneStatus::Critical => CRITICAL_COLOR,
        ZoneStatus::Warning => WARNING_COLOR,
        ZoneStatus::Safe => SAFE_COLOR,
    }
}

/// Pair every layout polygon with its zone, by name when the polygon carries
/// one and by position otherwise.
pub fn correlate<'a>(layout: &ZoneLayout, zones: &'a [ZoneViewModel]) -> Vec<Option<&'a ZoneViewModel>> {
    layout
        .zones
        .iter()
        .map(|item| match &item.name {
            Some(name) => zones.iter().find(|zone| &zone.name == name),
            None => zones.get(item.zone_index),
        })
        .collect()
}

/// Where and how one zone was drawn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZonePlacement {
    pub zone_index: usize,
    pub name: String,
    pub count: u64,
    pub status: ZoneStatus,
    pub intensity: f64,
    pub centroid: (f64, f64),
    pub has_data: bool,
}

/// Outcome of a single draw pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DrawReport {
    pub polygons: usize,
    pub max_count: u64,
    pub placements: Vec<ZonePlacement>,
    pub markers_drawn: usize,
    pub skipped_degenerate: usize,
    pub background: bool,
}

impl DrawReport {
    pub fn zones_drawn(&self) -> usize {
        self.placements.len()
    }
}

/// Full draw pass onto a fresh canvas. Everything the pass needs is passed
/// in, so callers decide which data is current at the time of drawing.
pub(crate) fn draw_heatmap(
    surface: &mut RgbaImage,
    background: Option<&FittedBackground>,
    layout: &ZoneLayout,
    zones: &[ZoneViewModel],
) -> DrawReport {
    let (width, height) = surface.dimensions();
    let max_count = max_count(zones);
    let mut report = DrawReport {
        polygons: layout.len(),
        max_count,
        background: background.is_some(),
        ..DrawReport::default()
    };

    let Some(mut pixmap) = blank(width, height, CLEAR_RGB) else {
        warn!("Cannot allocate a {width}x{height} canvas");
        *surface = RgbaImage::from_pixel(width, height, CLEAR_COLOR);
        return report;
    };

    let rect = match background {
        Some(fitted) => {
            draw_image(&mut pixmap, &fitted.image, fitted.rect.x, fitted.rect.y, BACKGROUND_ALPHA);
            fitted.rect
        }
        None => ImageRect {
            x: 0.0,
            y: 0.0,
            width: width as f64,
            height: height as f64,
        },
    };

    let mut labels = Vec::new();
    for (item, zone) in layout.zones.iter().zip(correlate(layout, zones)) {
        let vertices: Vec<(f64, f64)> = item
            .points
            .iter()
            .map(|p| (rect.x + p.x * rect.width, rect.y + p.y * rect.height))
            .collect();
        if vertices.len() < 3 {
            report.skipped_degenerate += 1;
            continue;
        }

        let count = zone.map_or(0, |zone| zone.count);
        let status = zone.map_or(ZoneStatus::Safe, |zone| zone.status);
        let name = zone.map_or_else(
            || format!("Zone {}", item.zone_index + 1),
            |zone| zone.name.clone(),
        );
        let intensity = zone_intensity(count, max_count);
        let centroid = centroid(&vertices);

        let stops = RadialStops {
            inner: (0.55 + intensity * 0.35) as f32,
            mid: (0.25 + intensity * 0.25) as f32,
            mid_offset: MID_STOP,
        };
        fill_polygon_radial(
            &mut pixmap,
            &vertices,
            centroid,
            BASE_SPREAD + intensity * SPREAD_PER_INTENSITY,
            status_color(status),
            stops,
        );

        if zone.is_some() {
            labels.push((centroid, name.clone(), count));
            report.markers_drawn += 1;
        }

        report.placements.push(ZonePlacement {
            zone_index: item.zone_index,
            name,
            count,
            status,
            intensity,
            centroid,
            has_data: zone.is_some(),
        });
    }

    let Some(mut image) = to_rgba(&pixmap) else {
        warn!("Canvas readback failed; keeping a cleared frame");
        *surface = RgbaImage::from_pixel(width, height, CLEAR_COLOR);
        return report;
    };
    for (centroid, name, count) in &labels {
        draw_label(&mut image, *centroid, name, *count);
    }
    draw_grid(&mut image, GRID_SPACING, GRID_COLOR);
    *surface = image;
    report
}

fn centroid(vertices: &[(f64, f64)]) -> (f64, f64) {
    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

fn draw_label(surface: &mut RgbaImage, (cx, cy): (f64, f64), name: &str, count: u64) {
    draw_centered_text(surface, cx, cy - 4.0, name, LABEL_COLOR);
    draw_centered_text(surface, cx, cy + 10.0, &format!("Count: {count}"), LABEL_COLOR);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RendererState {
    /// No layout yet; nothing is drawn.
    Loading,
    /// Layout available (possibly empty), waiting for the next trigger.
    Ready,
    /// A draw pass is underway.
    Rendering,
}

pub struct HeatmapRenderer {
    width: u32,
    height: u32,
    surface: Option<RgbaImage>,
    state: RendererState,
    layout: Option<ZoneLayout>,
    zones: Vec<ZoneViewModel>,
    max_count: u64,
    background: Option<FittedBackground>,
    background_generation: u64,
    pending_background: Option<Receiver<BackgroundLoaded>>,
    frames_drawn: u64,
    last_report: Option<DrawReport>,
}

impl HeatmapRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            surface: Some(RgbaImage::from_pixel(width, height, CLEAR_COLOR)),
            state: RendererState::Loading,
            layout: None,
            zones: Vec::new(),
            max_count: 1,
            background: None,
            background_generation: 0,
            pending_background: None,
            frames_drawn: 0,
            last_report: None,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }

    pub fn layout(&self) -> Option<&ZoneLayout> {
        self.layout.as_ref()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn last_report(&self) -> Option<&DrawReport> {
        self.last_report.as_ref()
    }

    /// Install the normalized layout. Leaves `Loading` on the first call; a
    /// failed layout fetch should pass an empty layout so the background and
    /// grid are still drawn.
    pub fn set_layout(&mut self, layout: ZoneLayout) -> Option<DrawReport> {
        if self.layout.as_ref() == Some(&layout) {
            return None;
        }
        debug!(polygons = layout.len(), "heatmap layout installed");
        self.layout = Some(layout);
        if self.state == RendererState::Loading {
            self.state = RendererState::Ready;
        }
        self.redraw()
    }

    /// Replace the zone list. Redraws only when the list or its maximum count
    /// changed.
    pub fn set_zones(&mut self, zones: &[ZoneViewModel]) -> Option<DrawReport> {
        let max = max_count(zones);
        if self.zones.as_slice() == zones && self.max_count == max {
            return None;
        }
        self.zones = zones.to_vec();
        self.max_count = max;
        self.redraw()
    }

    /// Start decoding a new background. Any earlier request still in flight
    /// is superseded.
    pub fn load_background(&mut self, source: BackgroundSource) {
        if !self.is_attached() {
            return;
        }
        self.background_generation += 1;
        self.pending_background = Some(spawn_decode(source, self.background_generation));
    }

    /// Apply a finished background decode, if any, and redraw with the data
    /// current now.
    pub fn poll_background(&mut self) -> Option<DrawReport> {
        let loaded = match self.pending_background.as_ref()?.try_recv() {
            Ok(loaded) => loaded,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                self.pending_background = None;
                return None;
            }
        };
        self.pending_background = None;
        self.install_background(loaded)
    }

    /// Block up to `timeout` for the pending background decode.
    pub fn wait_background(&mut self, timeout: Duration) -> Option<DrawReport> {
        let loaded = match self.pending_background.as_ref()?.recv_timeout(timeout) {
            Ok(loaded) => loaded,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                self.pending_background = None;
                return None;
            }
        };
        self.pending_background = None;
        self.install_background(loaded)
    }

    fn install_background(&mut self, loaded: BackgroundLoaded) -> Option<DrawReport> {
        if loaded.generation != self.background_generation || !self.is_attached() {
            debug!(
                generation = loaded.generation,
                current = self.background_generation,
                "ignoring superseded background"
            );
            return None;
        }
        match loaded.result {
            Ok(image) => match fit(&image, self.width, self.height) {
                Ok(fitted) => {
                    self.background = Some(fitted);
                    self.redraw()
                }
                Err(err) => {
                    warn!("{err}");
                    None
                }
            },
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    /// Clear and redraw everything. `None` while loading or once detached.
    pub fn redraw(&mut self) -> Option<DrawReport> {
        let layout = self.layout.as_ref()?;
        let surface = self.surface.as_mut()?;
        self.state = RendererState::Rendering;
        let report = draw_heatmap(surface, self.background.as_ref(), layout, &self.zones);
        self.state = RendererState::Ready;
        self.frames_drawn += 1;
        self.last_report = Some(report.clone());
        Some(report)
    }

    /// Drop the drawing surface. Pending background decodes and later
    /// triggers become no-ops.
    pub fn detach(&mut self) {
        self.surface = None;
        self.pending_background = None;
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        let surface = self.surface.as_ref().ok_or(RenderError::Detached)?;
        let mut buffer = Cursor::new(Vec::new());
        surface
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|err| RenderError::Encode(err.to_string()))?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::layout::{Point, ZoneLayoutItem};

    fn zone(name: &str, count: u64, status: ZoneStatus) -> ZoneViewModel {
        ZoneViewModel {
            id: String::new(),
            name: name.into(),
            count,
            price: 100.0,
            energy: "NORMAL (Lights 100%)".into(),
            status,
            manual: false,
        }
    }

    fn square(index: usize, x: f64, y: f64, size: f64) -> ZoneLayoutItem {
        ZoneLayoutItem {
            zone_index: index,
            points: vec![
                Point { x, y },
                Point { x: x + size, y },
                Point { x: x + size, y: y + size },
                Point { x, y: y + size },
            ],
            name: None,
        }
    }

    fn layout(n: usize) -> ZoneLayout {
        ZoneLayout {
            zones: (0..n).map(|i| square(i, 0.1 + i as f64 * 0.3, 0.2, 0.25)).collect(),
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn intensity_is_relative_to_busiest_zone_with_floor() {
        let zones = [zone("A", 10, ZoneStatus::Safe), zone("B", 100, ZoneStatus::Critical)];
        let max = max_count(&zones);
        assert_eq!(max, 100);
        assert_eq!(zone_intensity(10, max), 0.15);
        assert_eq!(zone_intensity(100, max), 1.0);
        assert_eq!(zone_intensity(0, max_count(&[])), MIN_INTENSITY);
    }

    #[test]
    fn status_colours_follow_precedence() {
        assert_eq!(status_color(ZoneStatus::Critical), CRITICAL_COLOR);
        assert_eq!(status_color(ZoneStatus::Warning), WARNING_COLOR);
        assert_eq!(status_color(ZoneStatus::Safe), SAFE_COLOR);
        assert_ne!(CRITICAL_COLOR, WARNING_COLOR);
    }

    #[test]
    fn draw_pass_reports_intensities() {
        let mut renderer = HeatmapRenderer::new(400, 300);
        renderer.set_layout(layout(2));
        let report = renderer
            .set_zones(&[zone("A", 10, ZoneStatus::Safe), zone("B", 100, ZoneStatus::Critical)])
            .unwrap();
        let intensities: Vec<f64> = report.placements.iter().map(|p| p.intensity).collect();
        assert_eq!(intensities, vec![0.15, 1.0]);
        assert_eq!(report.placements[1].status, ZoneStatus::Critical);
        assert_eq!(renderer.state(), RendererState::Ready);
    }

    #[test]
    fn nothing_is_drawn_while_loading() {
        let mut renderer = HeatmapRenderer::new(100, 100);
        assert_eq!(renderer.state(), RendererState::Loading);
        assert!(renderer.set_zones(&[zone("A", 1, ZoneStatus::Safe)]).is_none());
        assert_eq!(renderer.frames_drawn(), 0);
        // Zones given while loading are used by the first pass.
        let report = renderer.set_layout(layout(1)).unwrap();
        assert_eq!(report.placements[0].name, "A");
    }

    #[test]
    fn more_zones_than_polygons_truncates_markers() {
        let mut renderer = HeatmapRenderer::new(400, 300);
        renderer.set_layout(layout(2));
        let report = renderer
            .set_zones(&[
                zone("A", 1, ZoneStatus::Safe),
                zone("B", 2, ZoneStatus::Warning),
                zone("C", 3, ZoneStatus::Critical),
            ])
            .unwrap();
        assert_eq!(report.zones_drawn(), 2);
        assert_eq!(report.markers_drawn, 2);
        // Max count still comes from every zone, including the unplaced one.
        assert_eq!(report.max_count, 3);
    }

    #[test]
    fn more_polygons_than_zones_uses_defaults() {
        let mut renderer = HeatmapRenderer::new(400, 300);
        renderer.set_layout(layout(3));
        let report = renderer
            .set_zones(&[zone("A", 4, ZoneStatus::Safe), zone("B", 8, ZoneStatus::Warning)])
            .unwrap();
        assert_eq!(report.zones_drawn(), 3);
        assert_eq!(report.markers_drawn, 2);
        let third = &report.placements[2];
        assert!(!third.has_data);
        assert_eq!(third.name, "Zone 3");
        assert_eq!(third.count, 0);
        assert_eq!(third.status, ZoneStatus::Safe);
        assert_eq!(third.intensity, MIN_INTENSITY);
    }

    #[test]
    fn named_layout_items_match_by_name() {
        let mut items = layout(2).zones;
        items[0].name = Some("B".into());
        items[1].name = Some("missing".into());
        let named = ZoneLayout { zones: items };
        let zones = [zone("A", 1, ZoneStatus::Safe), zone("B", 9, ZoneStatus::Critical)];
        let matched = correlate(&named, &zones);
        assert_eq!(matched[0].map(|z| z.name.as_str()), Some("B"));
        assert!(matched[1].is_none());
    }

    #[test]
    fn degenerate_polygons_are_skipped() {
        let mut items = layout(1).zones;
        items.push(ZoneLayoutItem {
            zone_index: 1,
            points: vec![Point { x: 0.5, y: 0.5 }, Point { x: 0.6, y: 0.6 }],
            name: None,
        });
        let mut renderer = HeatmapRenderer::new(200, 200);
        renderer.set_zones(&[zone("A", 1, ZoneStatus::Safe), zone("B", 1, ZoneStatus::Safe)]);
        let report = renderer.set_layout(ZoneLayout { zones: items }).unwrap();
        assert_eq!(report.skipped_degenerate, 1);
        assert_eq!(report.zones_drawn(), 1);
    }

    #[test]
    fn empty_layout_still_draws_grid() {
        let mut renderer = HeatmapRenderer::new(120, 120);
        let report = renderer.set_layout(ZoneLayout::default()).unwrap();
        assert_eq!(report.zones_drawn(), 0);
        let surface = renderer.surface().unwrap();
        // Grid line at x = 0 is tinted, a pixel between lines is the clear colour.
        assert_ne!(*surface.get_pixel(0, 10), CLEAR_COLOR);
        assert_eq!(*surface.get_pixel(10, 10), CLEAR_COLOR);
    }

    #[test]
    fn zone_colour_lands_inside_its_polygon() {
        let mut renderer = HeatmapRenderer::new(200, 200);
        renderer.set_layout(ZoneLayout {
            zones: vec![square(0, 0.26, 0.26, 0.5)],
        });
        renderer.set_zones(&[zone("X", 50, ZoneStatus::Critical)]);
        let surface = renderer.surface().unwrap();
        // Sample a point off the label rows and off the grid lines.
        let inside = surface.get_pixel(70, 130);
        assert!(inside[0] > inside[1] && inside[0] > inside[2]);
        assert_eq!(*surface.get_pixel(20, 20), CLEAR_COLOR);
    }

    #[test]
    fn every_pass_starts_from_a_clean_canvas() {
        let mut renderer = HeatmapRenderer::new(200, 200);
        renderer.set_layout(ZoneLayout {
            zones: vec![square(0, 0.26, 0.26, 0.5)],
        });
        renderer.set_zones(&[zone("X", 50, ZoneStatus::Critical)]);
        let critical = *renderer.surface().unwrap().get_pixel(70, 130);
        assert!(critical[0] > critical[1]);

        renderer.set_zones(&[zone("X", 50, ZoneStatus::Safe)]);
        let safe = *renderer.surface().unwrap().get_pixel(70, 130);
        assert!(safe[1] > safe[0], "red tint survived the redraw: {safe:?}");

        // Dropping the polygon leaves nothing behind where it used to be.
        renderer.set_layout(ZoneLayout::default());
        assert_eq!(*renderer.surface().unwrap().get_pixel(70, 130), CLEAR_COLOR);
    }

    #[test]
    fn unchanged_zones_do_not_redraw() {
        let mut renderer = HeatmapRenderer::new(100, 100);
        renderer.set_layout(layout(1));
        let zones = [zone("A", 3, ZoneStatus::Safe)];
        assert!(renderer.set_zones(&zones).is_some());
        let frames = renderer.frames_drawn();
        assert!(renderer.set_zones(&zones).is_none());
        assert_eq!(renderer.frames_drawn(), frames);
    }

    #[test]
    fn background_completion_uses_current_zones() {
        let mut renderer = HeatmapRenderer::new(200, 100);
        renderer.set_layout(layout(1));
        renderer.load_background(BackgroundSource::Bytes(png_bytes(100, 100)));
        // Zones change while the decode is in flight.
        renderer.set_zones(&[zone("Later", 7, ZoneStatus::Warning)]);
        let report = renderer.wait_background(Duration::from_secs(5)).unwrap();
        assert!(report.background);
        assert_eq!(report.placements[0].name, "Later");
        assert_eq!(report.placements[0].count, 7);
    }

    #[test]
    fn superseded_background_is_ignored() {
        let mut renderer = HeatmapRenderer::new(100, 100);
        renderer.set_layout(layout(1));
        renderer.load_background(BackgroundSource::Bytes(png_bytes(10, 10)));
        let stale = renderer.pending_background.take().unwrap();
        renderer.load_background(BackgroundSource::Bytes(png_bytes(20, 20)));
        let loaded = stale.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(renderer.install_background(loaded).is_none());
        assert!(renderer.wait_background(Duration::from_secs(5)).is_some());
    }

    #[test]
    fn detached_renderer_ignores_triggers() {
        let mut renderer = HeatmapRenderer::new(100, 100);
        renderer.set_layout(layout(1));
        renderer.load_background(BackgroundSource::Bytes(png_bytes(10, 10)));
        renderer.detach();
        assert!(renderer.poll_background().is_none());
        assert!(renderer.set_zones(&[zone("A", 2, ZoneStatus::Safe)]).is_none());
        assert!(matches!(renderer.encode_png(), Err(RenderError::Detached)));
    }

    #[test]
    fn encoded_frame_is_png() {
        let mut renderer = HeatmapRenderer::new(64, 48);
        renderer.set_layout(layout(1));
        let png = renderer.encode_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
