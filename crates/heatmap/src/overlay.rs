//! Raster overlays drawn after the zone fills: text labels and the reference
//! grid.

use std::sync::OnceLock;

use ab_glyph::{FontRef, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{Blend, draw_line_segment_mut, draw_text_mut, text_size};
use tracing::warn;

const LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");
const LABEL_SCALE: f32 = 12.0;

/// Bundled label font, parsed once. `None` if the font is unusable, in
/// which case labels are skipped.
fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => Some(font),
        Err(err) => {
            warn!("Label font unavailable: {err}");
            None
        }
    })
    .as_ref()
}

/// Draw `text` horizontally centred on `center_x`, sitting on `baseline`.
/// Returns `false` when no font is available.
pub(crate) fn draw_centered_text(
    image: &mut RgbaImage,
    center_x: f64,
    baseline: f64,
    text: &str,
    color: Rgba<u8>,
) -> bool {
    let Some(font) = label_font() else {
        return false;
    };
    let scale = PxScale::from(LABEL_SCALE);
    let (width, height) = text_size(scale, font, text);
    let left = (center_x - width as f64 / 2.0).round() as i32;
    let top = (baseline - height as f64).round() as i32;
    draw_text_mut(image, color, left, top, scale, font, text);
    true
}

/// Hairlines every `spacing` pixels across the whole image, alpha-blended
/// over what is already drawn.
pub(crate) fn draw_grid(image: &mut RgbaImage, spacing: u32, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    if spacing == 0 || width == 0 || height == 0 {
        return;
    }
    let mut canvas = Blend(std::mem::take(image));
    let right = (width - 1) as f32;
    let bottom = (height - 1) as f32;
    for x in (0..width).step_by(spacing as usize) {
        draw_line_segment_mut(&mut canvas, (x as f32, 0.0), (x as f32, bottom), color);
    }
    for y in (0..height).step_by(spacing as usize) {
        draw_line_segment_mut(&mut canvas, (0.0, y as f32), (right, y as f32), color);
    }
    *image = canvas.0;
}
