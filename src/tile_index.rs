//! Grid-cell spatial index over boundary geometry.
//!
//! Each feature's bounding box is bucketed into fixed-size longitude/latitude
//! cells so the renderer can fetch candidate features per tile. The matcher
//! never consults this index.

use std::collections::HashMap;

use serde_json::Value;

use crate::boundary::BoundaryFeature;

/// Cell coordinates: `(column, row)` counted from (-180, -90).
pub type TileKey = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    fn from_point(lon: f64, lat: f64) -> Self {
        Self {
            west: lon,
            south: lat,
            east: lon,
            north: lat,
        }
    }

    fn extend(&mut self, lon: f64, lat: f64) {
        self.west = self.west.min(lon);
        self.south = self.south.min(lat);
        self.east = self.east.max(lon);
        self.north = self.north.max(lat);
    }

    fn merge(&mut self, other: &BoundingBox) {
        self.extend(other.west, other.south);
        self.extend(other.east, other.north);
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}

#[derive(Debug, Clone)]
pub struct TileIndex {
    cell_size: f64,
    bboxes: Vec<Option<BoundingBox>>,
    tiles: HashMap<TileKey, Vec<usize>>,
}

impl TileIndex {
    /// Default cell edge in degrees.
    pub const DEFAULT_CELL_SIZE: f64 = 1.0;

    pub fn build(features: &[BoundaryFeature]) -> Self {
        Self::with_cell_size(features, Self::DEFAULT_CELL_SIZE)
    }

    /// Build with a custom cell size. Non-positive sizes fall back to the default.
    pub fn with_cell_size(features: &[BoundaryFeature], cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            Self::DEFAULT_CELL_SIZE
        };

        let bboxes: Vec<Option<BoundingBox>> = features
            .iter()
            .map(|f| f.geometry.as_ref().and_then(geometry_bbox))
            .collect();

        let mut index = Self {
            cell_size,
            bboxes,
            tiles: HashMap::new(),
        };
        for (i, bbox) in index.bboxes.iter().enumerate() {
            let Some(bbox) = bbox else { continue };
            let (x0, y0) = index.tile_of(bbox.west, bbox.south);
            let (x1, y1) = index.tile_of(bbox.east, bbox.north);
            for x in x0..=x1 {
                for y in y0..=y1 {
                    index.tiles.entry((x, y)).or_default().push(i);
                }
            }
        }
        index
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Cell containing a point. Coordinates are clamped to the valid range.
    pub fn tile_of(&self, lon: f64, lat: f64) -> TileKey {
        let lon = lon.clamp(-180.0, 180.0);
        let lat = lat.clamp(-90.0, 90.0);
        (
            ((lon + 180.0) / self.cell_size).floor() as i32,
            ((lat + 90.0) / self.cell_size).floor() as i32,
        )
    }

    pub fn features_in_tile(&self, key: TileKey) -> &[usize] {
        self.tiles.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Features whose bounding box contains the point.
    pub fn features_at(&self, lon: f64, lat: f64) -> Vec<usize> {
        self.features_in_tile(self.tile_of(lon, lat))
            .iter()
            .copied()
            .filter(|&i| matches!(self.bboxes[i], Some(b) if b.contains(lon, lat)))
            .collect()
    }

    pub fn bbox(&self, feature: usize) -> Option<&BoundingBox> {
        self.bboxes.get(feature).and_then(Option::as_ref)
    }

    pub fn feature_count(&self) -> usize {
        self.bboxes.len()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

/// Bounding box of a GeoJSON geometry, walking nested coordinate arrays.
fn geometry_bbox(geometry: &Value) -> Option<BoundingBox> {
    if let Some(parts) = geometry.get("geometries").and_then(Value::as_array) {
        let mut acc: Option<BoundingBox> = None;
        for part in parts.iter().filter_map(geometry_bbox) {
            match acc.as_mut() {
                Some(b) => b.merge(&part),
                None => acc = Some(part),
            }
        }
        return acc;
    }
    let mut acc = None;
    collect_positions(geometry.get("coordinates")?, &mut acc);
    acc
}

fn collect_positions(coords: &Value, acc: &mut Option<BoundingBox>) {
    let Some(items) = coords.as_array() else { return };
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(lon), Some(lat)) => match acc.as_mut() {
            Some(b) => b.extend(lon, lat),
            None => *acc = Some(BoundingBox::from_point(lon, lat)),
        },
        _ => {
            for item in items {
                collect_positions(item, acc);
            }
        }
    }
}
