//! Altitude lookups.
//!
//! Altitudes are cached per rounded coordinate in the spawn registry. Cache
//! misses go to an elevation source (the Google Maps Elevation API in
//! production). Failed lookups never propagate: they are logged and replaced
//! by a random altitude from the configured range.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::point::Point;
use crate::state::SharedRegistry;
use crate::utils::{jitter, random_altitude, round_coords};

/// Locations per elevation request, keeps the query string well under URL limits.
const BATCH_SIZE: usize = 300;

/// Largest lattice (bounding box points) that is prefetched at start-up.
pub const MAX_PREFETCH_POINTS: u64 = 20_000;

#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// The service answered but returned no results.
    #[error("empty elevation response")]
    Empty,

    /// The response did not have the expected shape.
    #[error("invalid elevation response: {0}")]
    Malformed(String),

    /// The service reported an error status (e.g. `REQUEST_DENIED`).
    #[error("elevation service returned {0}")]
    Status(String),

    #[error("no elevation API key configured")]
    MissingKey,

    #[error("elevation request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Something that can tell the altitude of a set of points.
///
/// Implementations must return exactly one altitude per requested point,
/// in request order.
#[async_trait]
pub trait ElevationSource: Send + Sync {
    async fn elevations(&self, points: &[Point]) -> Result<Vec<f64>, ElevationError>;
}

/// Google Maps Elevation API client.
pub struct GoogleElevation {
    client: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    status: Option<String>,
    results: Option<Vec<ElevationResult>>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    elevation: Option<f64>,
}

impl GoogleElevation {
    pub fn new(endpoint: String, key: Option<String>) -> Result<Self, ElevationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            key,
        })
    }
}

#[async_trait]
impl ElevationSource for GoogleElevation {
    async fn elevations(&self, points: &[Point]) -> Result<Vec<f64>, ElevationError> {
        let key = self.key.as_deref().ok_or(ElevationError::MissingKey)?;

        let mut altitudes = Vec::with_capacity(points.len());
        for batch in points.chunks(BATCH_SIZE) {
            let locations = batch
                .iter()
                .map(|p| format!("{},{}", p.lat, p.lon))
                .collect::<Vec<_>>()
                .join("|");

            let response: ElevationResponse = self
                .client
                .get(&self.endpoint)
                .query(&[("locations", locations.as_str()), ("key", key)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            altitudes.extend(parse_response(response, batch.len())?);
        }
        Ok(altitudes)
    }
}

fn parse_response(response: ElevationResponse, expected: usize) -> Result<Vec<f64>, ElevationError> {
    match response.status.as_deref() {
        Some("OK") | Some("ZERO_RESULTS") | None => {}
        Some(other) => return Err(ElevationError::Status(other.to_string())),
    }

    let results = response
        .results
        .ok_or_else(|| ElevationError::Malformed("missing results".to_string()))?;
    if results.is_empty() {
        return Err(ElevationError::Empty);
    }
    if results.len() != expected {
        return Err(ElevationError::Malformed(format!(
            "expected {expected} results, got {}",
            results.len()
        )));
    }

    results
        .into_iter()
        .map(|r| {
            r.elevation
                .ok_or_else(|| ElevationError::Malformed("missing elevation".to_string()))
        })
        .collect()
}

/// Altitude for `point`, from the cache or the elevation source.
///
/// Cached values are jittered by up to `randomize` meters. Fetched values
/// are cached and returned as is. Failures fall back to a random altitude
/// within `alt_range` and are not cached.
pub async fn get_altitude(
    registry: &SharedRegistry,
    source: &dyn ElevationSource,
    point: Point,
    randomize: f64,
    alt_precision: u32,
    alt_range: (f64, f64),
) -> f64 {
    let rounded = round_coords(point, alt_precision);

    // The read guard is dropped before any network call
    let cached = registry.read().await.cached_altitude(&rounded);
    if let Some(altitude) = cached {
        return jitter(altitude, randomize);
    }

    match source.elevations(&[rounded]).await {
        Ok(altitudes) if !altitudes.is_empty() => {
            let altitude = altitudes[0];
            registry.write().await.set_altitude(rounded, altitude);
            altitude
        }
        Ok(_) | Err(ElevationError::Empty) => {
            tracing::warn!("Empty altitude response for {}, falling back to random.", rounded);
            random_altitude(alt_range)
        }
        Err(ElevationError::Malformed(reason)) => {
            tracing::error!(
                "Invalid altitude response for {} ({}), falling back to random.",
                rounded,
                reason
            );
            random_altitude(alt_range)
        }
        Err(e) => {
            tracing::error!("{} while fetching altitude for {}, falling back to random.", e, rounded);
            random_altitude(alt_range)
        }
    }
}

/// Fetch altitudes for every grid point of the map.
///
/// Returns whatever could be fetched; a failed batch is logged and skipped.
pub async fn prefetch_altitudes(
    source: &dyn ElevationSource,
    grid: &[Point],
) -> HashMap<Point, f64> {
    let mut altitudes = HashMap::with_capacity(grid.len());
    for batch in grid.chunks(BATCH_SIZE) {
        match source.elevations(batch).await {
            Ok(values) if values.len() == batch.len() => {
                altitudes.extend(batch.iter().copied().zip(values));
            }
            Ok(values) => {
                tracing::error!(
                    "Elevation source returned {} altitudes for {} points",
                    values.len(),
                    batch.len()
                );
            }
            Err(e) => {
                tracing::error!("Failed to prefetch {} altitudes: {}", batch.len(), e);
            }
        }
    }

    tracing::info!("Prefetched {} altitudes", altitudes.len());
    altitudes
}
