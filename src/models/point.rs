//! Geographic point used as a key throughout the registry.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A latitude/longitude pair in decimal degrees.
///
/// Points are used as map keys, so equality and hashing work on the raw
/// bit patterns of the coordinates. Two points are equal only when both
/// coordinates are bit-for-bit identical, which is what the database and
/// the workers produce for the same location.
///
/// Serialized as a `[lat, lon]` pair so that snapshots and API responses
/// stay compact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn key(&self) -> (u64, u64) {
        // -0.0 and 0.0 must hash alike
        let norm = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
        (norm(self.lat), norm(self.lon))
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl From<(f64, f64)> for Point {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

impl From<Point> for (f64, f64) {
    fn from(point: Point) -> Self {
        (point.lat, point.lon)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn negative_zero_matches_zero() {
        let mut set = HashSet::new();
        set.insert(Point::new(0.0, 10.0));
        assert!(set.contains(&Point::new(-0.0, 10.0)));
    }

    #[test]
    fn serializes_as_pair() {
        let json = serde_json::to_string(&Point::new(40.5, -73.25)).unwrap();
        assert_eq!(json, "[40.5,-73.25]");

        let point: Point = serde_json::from_str("[1.0,2.0]").unwrap();
        assert_eq!(point, Point::new(1.0, 2.0));
    }
}
