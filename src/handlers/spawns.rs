//! Spawn registry HTTP handlers.
//!
//! This module implements the spawn endpoints:
//! - GET /api/v1/spawns - Registry counters
//! - GET /api/v1/spawns/schedule - Scheduled spawns in appearance order
//! - GET /api/v1/spawns/mysteries - Points whose timing is unknown
//! - GET /api/v1/spawns/have - Whether a point is tracked
//! - GET /api/v1/spawns/{spawn_id}/despawn - Next despawn time of a spawn
//! - POST /api/v1/spawns/known - Record a confirmed spawn
//! - POST /api/v1/spawns/unknown - Record a point with unknown timing
//! - POST /api/v1/spawns/cell_points - Record a map cell point
//! - POST /api/v1/spawns/reload - Reload from the database
//! - POST /api/v1/spawns/snapshot - Write the snapshot to disk

use crate::{
    error::AppError,
    models::{
        point::Point,
        spawnpoint::{
            DespawnQuery, DespawnResponse, HaveResponse, KnownSpawnRequest, KnownSpawnResponse,
            PointRequest, SpawnStatsResponse,
        },
    },
    services::{registry_service, spawns::SpawnRegistry},
    state::AppState,
    utils::now_epoch,
};

/// Latest accepted sighting, 9999-12-31T23:59:59Z.
pub const MAX_SEEN: i64 = 253_402_300_799;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn stats(registry: &SpawnRegistry) -> SpawnStatsResponse {
    SpawnStatsResponse {
        known: registry.len(),
        unknown: registry.unknown_count(),
        cells: registry.cells_count(),
        total: registry.total_length(),
        after_last: registry.after_last(now_epoch()),
    }
}

/// Registry counters.
///
/// # Response (200)
///
/// ```json
/// {
///   "known": 1520,
///   "unknown": 213,
///   "cells": 0,
///   "total": 1733,
///   "after_last": false
/// }
/// ```
pub async fn get_stats(State(state): State<AppState>) -> Json<SpawnStatsResponse> {
    let registry = state.registry.read().await;
    Json(stats(&registry))
}

/// Scheduled spawns ordered by the second of the hour at which they appear.
pub async fn list_schedule(State(state): State<AppState>) -> Json<Vec<KnownSpawnResponse>> {
    let items = state.registry.read().await.items();

    Json(
        items
            .into_iter()
            .map(|(point, schedule)| KnownSpawnResponse {
                lat: point.lat,
                lon: point.lon,
                spawn_id: schedule.spawn_id,
                spawn_seconds: schedule.spawn_seconds,
            })
            .collect(),
    )
}

/// Points to explore, as `[lat, lon]` pairs.
pub async fn list_mysteries(State(state): State<AppState>) -> Json<Vec<Point>> {
    Json(state.registry.read().await.mysteries())
}

/// Whether a point is already tracked.
///
/// # Endpoint
///
/// `GET /api/v1/spawns/have?lat=40.78&lon=-73.96`
pub async fn have_point(
    State(state): State<AppState>,
    Query(query): Query<PointRequest>,
) -> Json<HaveResponse> {
    let have = state.registry.read().await.have_point(&query.point());
    Json(HaveResponse { have })
}

/// Epoch second at which a spawn disappears.
///
/// # Endpoint
///
/// `GET /api/v1/spawns/{spawn_id}/despawn?seen=1700000000`
///
/// `seen` defaults to now. When the despawn second has already passed in
/// the hour of the sighting, the time in the following hour is returned.
///
/// # Response
///
/// - **Success (200 OK)**: `{"spawn_id": 123, "despawn_time": 1700001250}`
/// - **Error (400)**: `seen` before 1970 or after year 9999
/// - **Error (404)**: No despawn time known for this spawn
pub async fn get_despawn_time(
    State(state): State<AppState>,
    Path(spawn_id): Path<i64>,
    Query(query): Query<DespawnQuery>,
) -> Result<Json<DespawnResponse>, AppError> {
    let seen = query.seen.unwrap_or_else(now_epoch);
    if !(0..=MAX_SEEN).contains(&seen) {
        return Err(AppError::InvalidRequest(format!(
            "seen must be between 0 and {MAX_SEEN}"
        )));
    }

    let despawn_time = state
        .registry
        .read()
        .await
        .get_despawn_time(spawn_id, seen)
        .ok_or(AppError::SpawnNotFound)?;

    Ok(Json(DespawnResponse {
        spawn_id,
        despawn_time,
    }))
}

/// Record a spawn whose despawn second was confirmed.
///
/// # Request Body
///
/// ```json
/// {
///   "spawn_id": 9876543210,
///   "despawn_time": 1250,
///   "lat": 40.7812,
///   "lon": -73.9665
/// }
/// ```
///
/// # Response
///
/// - **Success (204 No Content)**
/// - **Error (400)**: despawn_time or coordinates out of range
pub async fn add_known(
    State(state): State<AppState>,
    Json(request): Json<KnownSpawnRequest>,
) -> Result<StatusCode, AppError> {
    registry_service::record_known(&state, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a point whose timing is still unknown.
pub async fn add_unknown(
    State(state): State<AppState>,
    Json(request): Json<PointRequest>,
) -> Result<StatusCode, AppError> {
    let point = registry_service::validate_point(request.point())?;
    state.registry.write().await.add_unknown(point);
    Ok(StatusCode::NO_CONTENT)
}

/// Record a coordinate listed by a map cell.
///
/// # Response
///
/// - **201 Created**: the point is new and will be explored
/// - **200 OK**: already tracked, or cell points are disabled
pub async fn add_cell_point(
    State(state): State<AppState>,
    Json(request): Json<PointRequest>,
) -> Result<StatusCode, AppError> {
    let point = registry_service::validate_point(request.point())?;

    if state.registry.write().await.add_cell_point(point) {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

/// Reload spawn points from the database and return the new counters.
pub async fn reload(State(state): State<AppState>) -> Result<Json<SpawnStatsResponse>, AppError> {
    registry_service::reload(&state).await?;
    let registry = state.registry.read().await;
    Ok(Json(stats(&registry)))
}

/// Write the registry snapshot to disk.
pub async fn save_snapshot(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    registry_service::save_snapshot(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}
