//! Off-thread decoding of the stadium background image.
//!
//! Decoding a large still can take longer than a poll period, so it happens on
//! a worker thread. Each request carries the renderer's background generation;
//! the renderer ignores completions from superseded requests.

use std::{path::PathBuf, thread};

use crossbeam_channel::{Receiver, bounded};
use image::{RgbaImage, imageops::FilterType};
use tiny_skia::Pixmap;
use tracing::warn;

use crate::{canvas::to_pixmap, error::RenderError};

#[derive(Clone, Debug)]
pub enum BackgroundSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

pub(crate) struct BackgroundLoaded {
    pub(crate) generation: u64,
    pub(crate) result: Result<RgbaImage, RenderError>,
}

pub(crate) fn spawn_decode(source: BackgroundSource, generation: u64) -> Receiver<BackgroundLoaded> {
    let (tx, rx) = bounded(1);
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    let spawned = thread::Builder::new()
        .name("heatmap-background".into())
        .spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                let result = decode(&source);
                let _ = tx.send(BackgroundLoaded { generation, result });
            })
        });
    if let Err(err) = spawned {
        warn!("Failed to spawn background decoder: {err}");
    }
    rx
}

fn decode(source: &BackgroundSource) -> Result<RgbaImage, RenderError> {
    let dynamic = match source {
        BackgroundSource::Path(path) => image::open(path)
            .map_err(|err| RenderError::Decode(format!("{}: {err}", path.display())))?,
        BackgroundSource::Bytes(bytes) => {
            image::load_from_memory(bytes).map_err(|err| RenderError::Decode(err.to_string()))?
        }
    };
    Ok(dynamic.into_rgba8())
}

/// Placement of the background inside the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Scale an `image_w x image_h` picture to fit the canvas, centred, keeping
/// its aspect ratio.
pub fn letterbox(image_w: u32, image_h: u32, canvas_w: u32, canvas_h: u32) -> ImageRect {
    if image_w == 0 || image_h == 0 {
        return ImageRect {
            x: 0.0,
            y: 0.0,
            width: canvas_w as f64,
            height: canvas_h as f64,
        };
    }
    let scale = (canvas_w as f64 / image_w as f64).min(canvas_h as f64 / image_h as f64);
    let width = image_w as f64 * scale;
    let height = image_h as f64 * scale;
    ImageRect {
        x: canvas_w as f64 / 2.0 - width / 2.0,
        y: canvas_h as f64 / 2.0 - height / 2.0,
        width,
        height,
    }
}

/// Background already resized to its letterboxed rectangle and converted to
/// a premultiplied pixmap.
#[derive(Clone, Debug)]
pub(crate) struct FittedBackground {
    pub(crate) rect: ImageRect,
    pub(crate) image: Pixmap,
}

pub(crate) fn fit(
    image: &RgbaImage,
    canvas_w: u32,
    canvas_h: u32,
) -> Result<FittedBackground, RenderError> {
    let rect = letterbox(image.width(), image.height(), canvas_w, canvas_h);
    let target_w = (rect.width.round() as u32).max(1);
    let target_h = (rect.height.round() as u32).max(1);
    let resized = if target_w == image.width() && target_h == image.height() {
        image.clone()
    } else {
        image::imageops::resize(image, target_w, target_h, FilterType::Triangle)
    };
    let image = to_pixmap(&resized).ok_or_else(|| {
        RenderError::Decode(format!("background of {target_w}x{target_h} cannot be drawn"))
    })?;
    Ok(FittedBackground { rect, image })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn wide_images_are_letterboxed_vertically() {
        let rect = letterbox(1600, 600, 800, 600);
        assert_eq!(rect.width, 800.0);
        assert_eq!(rect.height, 300.0);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 150.0);
    }

    #[test]
    fn tall_images_are_pillarboxed() {
        let rect = letterbox(300, 600, 800, 600);
        assert_eq!(rect.height, 600.0);
        assert_eq!(rect.width, 300.0);
        assert_eq!(rect.x, 250.0);
        assert_eq!(rect.y, 0.0);
    }

    #[test]
    fn fitted_background_matches_rect() {
        let image = RgbaImage::new(400, 100);
        let fitted = fit(&image, 800, 600).unwrap();
        assert_eq!((fitted.image.width(), fitted.image.height()), (800, 200));
        assert_eq!(fitted.rect.y, 200.0);
    }

    #[test]
    fn undecodable_bytes_report_an_error() {
        let rx = spawn_decode(BackgroundSource::Bytes(b"nope".to_vec()), 7);
        let loaded = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(loaded.generation, 7);
        assert!(matches!(loaded.result, Err(RenderError::Decode(_))));
    }
}
