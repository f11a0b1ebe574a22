//! Zone layout normalization and crowd-density heatmap rendering.
//!
//! - `layout`: pixel-space polygons to unit-square layouts.
//! - `renderer`: layout + live zones + optional background to an RGBA frame.
//! - `background`, `canvas`, `overlay`: the raster plumbing behind the renderer.

mod background;
mod canvas;
pub mod error;
pub mod layout;
mod overlay;
pub mod renderer;

pub use background::{BackgroundSource, ImageRect, letterbox};
pub use error::{LayoutError, RenderError};
pub use layout::{
    LayoutConfig, NormalizedPolygon, Point, RawPolygon, ZoneLayout, ZoneLayoutItem, load_layout,
    normalize, parse_layout_config,
};
pub use renderer::{
    DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DrawReport, GRID_SPACING, HeatmapRenderer,
    MIN_INTENSITY, RendererState, ZonePlacement, correlate, max_count, status_color,
    zone_intensity,
};
