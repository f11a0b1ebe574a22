//! Zone polygon layouts.
//!
//! Polygons are drawn once by an operator on a camera still and stored in
//! pixel space as `{ "zones": [[[x, y], ...], ...] }`. The renderer works in a
//! unit square so the same layout fits any canvas; `normalize` does that
//! conversion using the maxima of the whole set, which keeps zones at the same
//! relative scale.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Pixel-space polygon, one `[x, y]` pair per vertex.
pub type RawPolygon = Vec<[f64; 2]>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Polygon with every vertex inside `[0, 1] x [0, 1]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPolygon {
    pub points: Vec<Point>,
}

/// Scale every polygon by the global maximum x and y of the whole set.
///
/// Vertex and polygon order are preserved. A non-positive maximum is replaced
/// by 1 so an all-zero layout maps to zeros instead of NaN. Polygons with fewer
/// than three vertices are passed through; skipping them is up to the renderer.
pub fn normalize(raw: &[RawPolygon]) -> Vec<NormalizedPolygon> {
    let (max_x, max_y) = raw
        .iter()
        .flatten()
        .fold((f64::MIN, f64::MIN), |(mx, my), [x, y]| (mx.max(*x), my.max(*y)));
    let max_x = if max_x > 0.0 { max_x } else { 1.0 };
    let max_y = if max_y > 0.0 { max_y } else { 1.0 };

    raw.iter()
        .map(|polygon| NormalizedPolygon {
            points: polygon
                .iter()
                .map(|[x, y]| Point {
                    x: x / max_x,
                    y: y / max_y,
                })
                .collect(),
        })
        .collect()
}

/// One entry of `GET /api/zone-layout`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneLayoutItem {
    pub zone_index: usize,
    pub points: Vec<Point>,
    /// Backend zone name, when the layout file carries one. Lets the renderer
    /// match by name instead of by position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneLayout {
    pub zones: Vec<ZoneLayoutItem>,
}

impl ZoneLayout {
    pub fn from_config(config: &LayoutConfig) -> Self {
        let zones = normalize(&config.zones)
            .into_iter()
            .enumerate()
            .map(|(zone_index, polygon)| ZoneLayoutItem {
                zone_index,
                points: polygon.points,
                name: config.names.get(zone_index).cloned(),
            })
            .collect();
        Self { zones }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// On-disk layout file. `names` is optional and positional.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub zones: Vec<RawPolygon>,
    #[serde(default)]
    pub names: Vec<String>,
}

pub fn parse_layout_config(bytes: &[u8]) -> Result<LayoutConfig, LayoutError> {
    serde_json::from_slice(bytes).map_err(LayoutError::Parse)
}

/// Read and normalize a layout file.
pub fn load_layout(path: &Path) -> Result<ZoneLayout, LayoutError> {
    let bytes = fs::read(path).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_layout_config(&bytes)?;
    Ok(ZoneLayout::from_config(&config))
}
