//! Map boundaries.
//!
//! The scanned area is either the rectangle spanned by `MAP_START` and
//! `MAP_END`, or an explicit polygon from `BOUNDARIES`. Spawn loading uses
//! the bounding box as a cheap database filter, then applies the exact
//! polygon test in memory.

use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;

use crate::models::point::Point;

/// Axis-aligned box in decimal degrees. All edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Build a box from two opposite corners given in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            north: a.lat.max(b.lat),
            south: a.lat.min(b.lat),
            east: a.lon.max(b.lon),
            west: a.lon.min(b.lon),
        }
    }

    fn from_points(points: &[Point]) -> Self {
        points.iter().skip(1).fold(
            BoundingBox::from_corners(points[0], points[0]),
            |bbox, p| Self {
                north: bbox.north.max(p.lat),
                south: bbox.south.min(p.lat),
                east: bbox.east.max(p.lon),
                west: bbox.west.min(p.lon),
            },
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Bounds {
    Rectangle(BoundingBox),
    Polygon {
        vertices: Vec<Point>,
        bbox: BoundingBox,
    },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BoundsError {
    #[error("a polygon boundary needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
}

impl Bounds {
    pub fn rectangle(start: Point, end: Point) -> Self {
        Bounds::Rectangle(BoundingBox::from_corners(start, end))
    }

    pub fn polygon(vertices: Vec<Point>) -> Result<Self, BoundsError> {
        if vertices.len() < 3 {
            return Err(BoundsError::TooFewVertices(vertices.len()));
        }
        let bbox = BoundingBox::from_points(&vertices);
        Ok(Bounds::Polygon { vertices, bbox })
    }

    /// True when an explicit polygon boundary is configured.
    pub fn is_polygon(&self) -> bool {
        matches!(self, Bounds::Polygon { .. })
    }

    pub fn bbox(&self) -> BoundingBox {
        match self {
            Bounds::Rectangle(bbox) => *bbox,
            Bounds::Polygon { bbox, .. } => *bbox,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        match self {
            Bounds::Rectangle(bbox) => bbox.contains(point),
            Bounds::Polygon { vertices, bbox } => {
                bbox.contains(point) && polygon_contains(vertices, point)
            }
        }
    }

    /// Stable digest of the boundary shape.
    ///
    /// Stored in snapshots; any change to the configured area yields a
    /// different fingerprint and forces a reload from the database.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Bounds::Rectangle(bbox) => {
                hasher.update(b"rectangle");
                for v in [bbox.north, bbox.south, bbox.east, bbox.west] {
                    hasher.update(v.to_le_bytes());
                }
            }
            Bounds::Polygon { vertices, .. } => {
                hasher.update(b"polygon");
                for p in vertices {
                    hasher.update(p.lat.to_le_bytes());
                    hasher.update(p.lon.to_le_bytes());
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Number of lattice points in the bounding box at `precision`.
    ///
    /// Computed without building the lattice; saturates instead of overflowing.
    pub fn grid_len(&self, precision: u32) -> u64 {
        let (lat_range, lon_range) = self.lattice(precision);
        axis_len(&lat_range).saturating_mul(axis_len(&lon_range))
    }

    /// Lattice points inside the bounds, spaced `10^-precision` degrees apart.
    ///
    /// Coordinates are produced on the same grid that altitude rounding
    /// uses, so every returned point is a valid altitude cache key.
    /// Returns `None` when the bounding box holds more than `limit` lattice
    /// points; nothing is allocated in that case.
    pub fn grid(&self, precision: u32, limit: u64) -> Option<Vec<Point>> {
        if self.grid_len(precision) > limit {
            return None;
        }

        let scale = 10f64.powi(precision as i32);
        let (lat_range, lon_range) = self.lattice(precision);
        let mut points = Vec::new();
        for lat in lat_range {
            for lon in lon_range.clone() {
                let point = Point::new(lat as f64 / scale, lon as f64 / scale);
                if self.contains(point) {
                    points.push(point);
                }
            }
        }
        Some(points)
    }

    /// Integer lattice indices covering the bounding box.
    fn lattice(&self, precision: u32) -> (RangeInclusive<i64>, RangeInclusive<i64>) {
        let scale = 10f64.powi(precision as i32);
        let bbox = self.bbox();
        (
            (bbox.south * scale).ceil() as i64..=(bbox.north * scale).floor() as i64,
            (bbox.west * scale).ceil() as i64..=(bbox.east * scale).floor() as i64,
        )
    }
}

fn axis_len(range: &RangeInclusive<i64>) -> u64 {
    if range.is_empty() {
        return 0;
    }
    range.end().abs_diff(*range.start()).saturating_add(1)
}

/// Even-odd ray casting with longitude as x and latitude as y.
fn polygon_contains(vertices: &[Point], point: Point) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (a, b) = (vertices[i], vertices[j]);
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let cross_lon = (b.lon - a.lon) * (point.lat - a.lat) / (b.lat - a.lat) + a.lon;
            if point.lon < cross_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
