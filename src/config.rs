//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a type-safe struct,
//! then derives the validated settings the spawn registry runs with.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::bounds::{Bounds, BoundsError};
use crate::models::point::Point;
use crate::services::spawns::RegistryMode;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `MAP_START`, `MAP_END` (required): opposite map corners as `"lat,lon"`
/// - `BOUNDARIES` (optional): JSON array of `[lat, lon]` polygon vertices
/// - `STAY_WITHIN_MAP` (optional): filter spawns to the map box, defaults to true
/// - `LAST_MIGRATION` (optional): epoch seconds; older spawn timings are discarded
/// - `ALT_PRECISION` (optional): decimal places for altitude buckets, defaults to 2
/// - `ALT_RANGE` (optional): `"min,max"` fallback altitude range, defaults to `"300,400"`
/// - `MORE_POINTS` (optional): also track map cell points, defaults to false
/// - `GOOGLE_MAPS_KEY` (optional): key for the elevation API
/// - `ELEVATION_URL` (optional): elevation API endpoint
/// - `SNAPSHOT_DIR` (optional): where the registry snapshot is kept, defaults to `pickles`
/// - `API_TOKEN_HASH` (optional): hex SHA-256 of the bearer token for write routes
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub map_start: String,
    pub map_end: String,

    #[serde(default)]
    pub boundaries: Option<String>,

    #[serde(default = "default_true")]
    pub stay_within_map: bool,

    #[serde(default = "default_last_migration")]
    pub last_migration: i64,

    #[serde(default = "default_alt_precision")]
    pub alt_precision: u32,

    #[serde(default = "default_alt_range")]
    pub alt_range: String,

    #[serde(default)]
    pub more_points: bool,

    #[serde(default)]
    pub google_maps_key: Option<String>,

    #[serde(default = "default_elevation_url")]
    pub elevation_url: String,

    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    #[serde(default)]
    pub api_token_hash: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

/// 2016-12-17 00:00 UTC, when spawn timings last changed.
fn default_last_migration() -> i64 {
    1_481_932_800
}

fn default_alt_precision() -> u32 {
    2
}

fn default_alt_range() -> String {
    "300,400".to_string()
}

fn default_elevation_url() -> String {
    "https://maps.googleapis.com/maps/api/elevation/json".to_string()
}

fn default_snapshot_dir() -> String {
    "pickles".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Invalid BOUNDARIES: {0}")]
    Bounds(#[from] BoundsError),
}

/// Finest altitude bucket, about 11 cm at the equator.
pub const MAX_ALT_PRECISION: u32 = 6;

/// Validated settings the spawn registry is built with.
#[derive(Debug, Clone)]
pub struct SpawnSettings {
    pub bounds: Bounds,
    pub stay_within_map: bool,
    pub last_migration: i64,
    pub alt_precision: u32,
    pub alt_range: (f64, f64),
    pub mode: RegistryMode,

    /// Hex SHA-256 of the database location, used to tie snapshots to a database
    pub db_hash: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - Map corners, boundaries or the altitude range are malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        // Fail at startup rather than on first use
        config.spawn_settings()?;
        Ok(config)
    }

    pub fn spawn_settings(&self) -> Result<SpawnSettings, ConfigError> {
        if self.alt_precision > MAX_ALT_PRECISION {
            return Err(ConfigError::Invalid {
                key: "ALT_PRECISION",
                reason: format!("must be at most {MAX_ALT_PRECISION}, got {}", self.alt_precision),
            });
        }

        Ok(SpawnSettings {
            bounds: self.bounds()?,
            stay_within_map: self.stay_within_map,
            last_migration: self.last_migration,
            alt_precision: self.alt_precision,
            alt_range: self.alt_range()?,
            mode: if self.more_points {
                RegistryMode::MorePoints
            } else {
                RegistryMode::Standard
            },
            db_hash: db_hash(&self.database_url),
        })
    }

    /// The configured polygon if `BOUNDARIES` is set, otherwise the map rectangle.
    pub fn bounds(&self) -> Result<Bounds, ConfigError> {
        if let Some(raw) = self.boundaries.as_deref().filter(|s| !s.trim().is_empty()) {
            let vertices: Vec<Point> =
                serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
                    key: "BOUNDARIES",
                    reason: e.to_string(),
                })?;
            return Ok(Bounds::polygon(vertices)?);
        }

        let start = parse_pair("MAP_START", &self.map_start)?;
        let end = parse_pair("MAP_END", &self.map_end)?;
        Ok(Bounds::rectangle(start.into(), end.into()))
    }

    pub fn alt_range(&self) -> Result<(f64, f64), ConfigError> {
        let (min, max) = parse_pair("ALT_RANGE", &self.alt_range)?;
        if !min.is_finite() || !max.is_finite() {
            return Err(ConfigError::Invalid {
                key: "ALT_RANGE",
                reason: format!("bounds must be finite, got {min},{max}"),
            });
        }
        if min > max {
            return Err(ConfigError::Invalid {
                key: "ALT_RANGE",
                reason: format!("minimum {min} exceeds maximum {max}"),
            });
        }
        Ok((min, max))
    }
}

/// Parse `"a,b"` into two floats.
fn parse_pair(key: &'static str, raw: &str) -> Result<(f64, f64), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { key, reason };

    let (a, b) = raw
        .split_once(',')
        .ok_or_else(|| invalid(format!("expected \"a,b\", got {raw:?}")))?;
    let a = a.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    let b = b.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    Ok((a, b))
}

/// Hash of the database location with credentials stripped.
///
/// Changing the password must not invalidate snapshots, pointing at a
/// different database must.
fn db_hash(database_url: &str) -> String {
    let canonical = match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => database_url.to_string(),
    };
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
