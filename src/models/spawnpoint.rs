//! Spawn point data models and API request/response types.
//!
//! This module defines:
//! - `Spawnpoint`: Database entity from the `spawnpoints` table
//! - `AltitudeRow`: Database entity from the `altitudes` table
//! - Request bodies and query strings accepted by the spawn API
//! - Response bodies returned to clients

use serde::{Deserialize, Serialize};

use super::point::Point;

/// Represents a spawn point record from the database.
///
/// # Timing Fields
///
/// - `despawn_time` is measured in seconds past the top of the hour (0..3600)
/// - `duration` is the spawn's lifetime in minutes; `60` marks hour-long
///   spawns whose spawn and despawn second coincide
/// - `updated` is the epoch second at which the timing was last confirmed
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Spawnpoint {
    /// Game-assigned spawn identifier
    pub spawn_id: i64,

    /// Seconds past the hour at which the spawn disappears
    pub despawn_time: i32,

    pub lat: f64,
    pub lon: f64,

    /// Altitude recorded when the spawn was stored, if any
    pub alt: Option<f64>,

    /// Epoch seconds of the last confirmed sighting
    ///
    /// Rows updated at or before the configured last migration are
    /// considered stale and their timing is treated as unknown.
    pub updated: Option<i64>,

    /// Spawn lifetime in minutes
    pub duration: Option<i16>,
}

impl Spawnpoint {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }

    /// Second of the hour at which this spawn appears.
    ///
    /// Hour-long spawns appear at their despawn second; everything else is
    /// assumed to be a 30 minute spawn.
    pub fn spawn_seconds(&self) -> i32 {
        if self.duration == Some(60) {
            self.despawn_time
        } else {
            (self.despawn_time + 1800) % 3600
        }
    }
}

/// Cached altitude for a rounded map location.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AltitudeRow {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}

/// Request body for reporting a spawn with a confirmed despawn time.
///
/// # JSON Example
///
/// ```json
/// {
///   "spawn_id": 9876543210,
///   "despawn_time": 1250,
///   "lat": 40.7812,
///   "lon": -73.9665,
///   "duration": 30
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct KnownSpawnRequest {
    pub spawn_id: i64,

    /// Seconds past the hour, must be below 3600
    pub despawn_time: i32,

    pub lat: f64,
    pub lon: f64,

    #[serde(default)]
    pub duration: Option<i16>,
}

impl KnownSpawnRequest {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}

/// Request body carrying a single coordinate pair.
#[derive(Debug, Deserialize)]
pub struct PointRequest {
    pub lat: f64,
    pub lon: f64,
}

impl PointRequest {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}

/// Query string for `GET /api/v1/spawns/{spawn_id}/despawn`.
#[derive(Debug, Deserialize)]
pub struct DespawnQuery {
    /// Epoch seconds of the sighting, defaults to now
    pub seen: Option<i64>,
}

/// Query string for `GET /api/v1/altitude`.
#[derive(Debug, Deserialize)]
pub struct AltitudeQuery {
    pub lat: f64,
    pub lon: f64,

    /// Jitter applied to cached altitudes, in meters
    #[serde(default)]
    pub randomize: f64,
}

/// A scheduled spawn as returned to clients.
#[derive(Debug, Serialize)]
pub struct KnownSpawnResponse {
    pub lat: f64,
    pub lon: f64,
    pub spawn_id: i64,
    pub spawn_seconds: i32,
}

/// Registry counters.
#[derive(Debug, Serialize)]
pub struct SpawnStatsResponse {
    /// Spawns with a known despawn time
    pub known: usize,

    /// Points with unknown timing
    pub unknown: usize,

    /// Points reported by map cells (always 0 unless more points is enabled)
    pub cells: usize,

    pub total: usize,

    /// Whether the current second of the hour is past the last scheduled spawn
    pub after_last: bool,
}

#[derive(Debug, Serialize)]
pub struct DespawnResponse {
    pub spawn_id: i64,

    /// Epoch seconds at which the spawn disappears
    pub despawn_time: i64,
}

#[derive(Debug, Serialize)]
pub struct HaveResponse {
    pub have: bool,
}

#[derive(Debug, Serialize)]
pub struct AltitudeResponse {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}
