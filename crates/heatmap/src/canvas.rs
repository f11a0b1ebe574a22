//! Vector drawing on a `tiny-skia` pixmap: the clear fill, the background
//! composite and the polygon-clipped radial zone gradients.

use image::RgbaImage;
use tiny_skia::{
    Color, ColorU8, FillRule, GradientStop, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Point,
    RadialGradient, SpreadMode, Transform,
};

/// Alpha of a three-stop radial ramp. The outer stop at 1.0 is transparent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RadialStops {
    pub(crate) inner: f32,
    pub(crate) mid: f32,
    pub(crate) mid_offset: f32,
}

pub(crate) fn blank(width: u32, height: u32, clear: [u8; 3]) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(width, height)?;
    pixmap.fill(Color::from_rgba8(clear[0], clear[1], clear[2], 255));
    Some(pixmap)
}

/// Straight-alpha image to a premultiplied pixmap.
pub(crate) fn to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
    }
    Some(pixmap)
}

/// Premultiplied pixmap back to a straight-alpha image.
pub(crate) fn to_rgba(pixmap: &Pixmap) -> Option<RgbaImage> {
    let raw = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect();
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
}

pub(crate) fn draw_image(target: &mut Pixmap, image: &Pixmap, x: f64, y: f64, opacity: f32) {
    let paint = PixmapPaint {
        opacity,
        ..PixmapPaint::default()
    };
    target.draw_pixmap(
        x.round() as i32,
        y.round() as i32,
        image.as_ref(),
        &paint,
        Transform::identity(),
        None,
    );
}

/// Closed path through `vertices`. `None` for fewer than three points.
pub(crate) fn polygon_path(vertices: &[(f64, f64)]) -> Option<Path> {
    let (first, rest) = vertices.split_first()?;
    if rest.len() < 2 {
        return None;
    }
    let mut builder = PathBuilder::new();
    builder.move_to(first.0 as f32, first.1 as f32);
    for (x, y) in rest {
        builder.line_to(*x as f32, *y as f32);
    }
    builder.close();
    builder.finish()
}

/// Fill the polygon with a radial gradient centred at `center`; pixels
/// outside the polygon are untouched. Returns `false` when nothing could be
/// drawn.
pub(crate) fn fill_polygon_radial(
    target: &mut Pixmap,
    vertices: &[(f64, f64)],
    center: (f64, f64),
    radius: f64,
    color: [u8; 3],
    stops: RadialStops,
) -> bool {
    let Some(path) = polygon_path(vertices) else {
        return false;
    };
    let [r, g, b] = color;
    let center = Point::from_xy(center.0 as f32, center.1 as f32);
    let shader = RadialGradient::new(
        center,
        center,
        radius as f32,
        vec![
            GradientStop::new(0.0, Color::from_rgba8(r, g, b, alpha_byte(stops.inner))),
            GradientStop::new(stops.mid_offset, Color::from_rgba8(r, g, b, alpha_byte(stops.mid))),
            GradientStop::new(1.0, Color::from_rgba8(r, g, b, 0)),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    );
    let Some(shader) = shader else {
        return false;
    };
    let paint = Paint {
        shader,
        anti_alias: true,
        ..Paint::default()
    };
    target.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    true
}

fn alpha_byte(alpha: f32) -> u8 {
    (alpha.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    const WHITE: [u8; 3] = [255, 255, 255];

    #[test]
    fn pixmap_round_trip_keeps_opaque_pixels() {
        let pixmap = blank(4, 3, [10, 20, 30]).unwrap();
        let image = to_rgba(&pixmap).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(*image.get_pixel(3, 2), Rgba([10, 20, 30, 255]));
        let back = to_pixmap(&image).unwrap();
        assert_eq!(back.data(), pixmap.data());
    }

    #[test]
    fn paths_need_three_points() {
        assert!(polygon_path(&[(0.0, 0.0), (5.0, 5.0)]).is_none());
        assert!(polygon_path(&[(0.0, 0.0), (5.0, 0.0), (5.0, 5.0)]).is_some());
    }

    #[test]
    fn radial_fill_stays_inside_polygon() {
        let mut pixmap = blank(40, 40, WHITE).unwrap();
        let square = [(10.0, 10.0), (30.0, 10.0), (30.0, 30.0), (10.0, 30.0)];
        let stops = RadialStops {
            inner: 1.0,
            mid: 1.0,
            mid_offset: 0.45,
        };
        assert!(fill_polygon_radial(&mut pixmap, &square, (20.0, 20.0), 200.0, [255, 0, 0], stops));
        let image = to_rgba(&pixmap).unwrap();
        let inside = image.get_pixel(20, 20);
        assert!(inside[0] > 240 && inside[1] < 30);
        assert_eq!(*image.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
        assert_eq!(*image.get_pixel(37, 20), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn gradient_fades_towards_the_rim() {
        let mut pixmap = blank(100, 100, WHITE).unwrap();
        let square = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        let stops = RadialStops {
            inner: 0.9,
            mid: 0.5,
            mid_offset: 0.45,
        };
        fill_polygon_radial(&mut pixmap, &square, (50.0, 50.0), 40.0, [0, 0, 255], stops);
        let image = to_rgba(&pixmap).unwrap();
        // Red channel drops as blue coverage rises.
        let centre = image.get_pixel(50, 50)[0];
        let middle = image.get_pixel(75, 50)[0];
        assert!(centre < middle);
        assert_eq!(*image.get_pixel(95, 50), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn background_is_composited_with_opacity() {
        let mut target = blank(10, 10, WHITE).unwrap();
        let overlay = blank(4, 4, [0, 0, 0]).unwrap();
        draw_image(&mut target, &overlay, 2.0, 2.0, 0.6);
        let image = to_rgba(&target).unwrap();
        let covered = image.get_pixel(3, 3)[0];
        assert!((95..=110).contains(&covered), "got {covered}");
        assert_eq!(*image.get_pixel(8, 8), Rgba([255, 255, 255, 255]));
    }
}
