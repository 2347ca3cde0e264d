//! Altitude lookup handler.

use crate::{
    error::AppError,
    models::{
        point::Point,
        spawnpoint::{AltitudeQuery, AltitudeResponse},
    },
    services::{altitude, registry_service::validate_point},
    state::AppState,
    utils::MAX_JITTER,
};
use axum::{
    Json,
    extract::{Query, State},
};

/// Altitude for a coordinate.
///
/// # Endpoint
///
/// `GET /api/v1/altitude?lat=40.78&lon=-73.96&randomize=5`
///
/// Never fails because of the elevation service: lookups that cannot be
/// answered return a random altitude from the configured range.
///
/// # Errors
///
/// - `InvalidRequest`: coordinates out of range, or `randomize` not a
///   finite number of at most 1000 meters
pub async fn get_altitude(
    State(state): State<AppState>,
    Query(query): Query<AltitudeQuery>,
) -> Result<Json<AltitudeResponse>, AppError> {
    let point = validate_point(Point::new(query.lat, query.lon))?;
    if !query.randomize.is_finite() || query.randomize.abs() > MAX_JITTER {
        return Err(AppError::InvalidRequest(format!(
            "randomize must be a number between -{MAX_JITTER} and {MAX_JITTER}"
        )));
    }

    let altitude = altitude::get_altitude(
        &state.registry,
        state.elevation.as_ref(),
        point,
        query.randomize,
        state.settings.alt_precision,
        state.settings.alt_range,
    )
    .await;

    Ok(Json(AltitudeResponse {
        lat: point.lat,
        lon: point.lon,
        altitude,
    }))
}
