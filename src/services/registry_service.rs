//! Registry service - keeps the in-memory spawn registry in sync with storage.
//!
//! This service handles:
//! - Loading spawn points from the database
//! - Filling the altitude cache (database first, elevation API second)
//! - Restoring and saving snapshots
//! - Recording newly confirmed spawns
//!
//! Database and network calls are made without holding the registry lock.

use std::collections::HashMap;

use crate::{
    config::SpawnSettings,
    error::AppError,
    models::{
        point::Point,
        spawnpoint::{KnownSpawnRequest, Spawnpoint},
    },
    services::{
        altitude,
        snapshot::{self, Restored},
        spawns::{LoadOptions, SpawnRegistry},
    },
    state::AppState,
    utils::{now_epoch, round_coords},
};

pub fn load_options(settings: &SpawnSettings) -> LoadOptions<'_> {
    LoadOptions {
        bounds: &settings.bounds,
        stay_within_map: settings.stay_within_map,
        last_migration: settings.last_migration,
        alt_precision: settings.alt_precision,
    }
}

/// Merge all spawn points from the database into the registry.
///
/// # Process
///
/// 1. Query spawn points, limited to the map box when configured
/// 2. Merge them into the registry under a write lock
/// 3. Fill the altitude cache if it is still empty
pub async fn reload(state: &AppState) -> Result<(), AppError> {
    let opts = load_options(&state.settings);
    let bbox = opts.filter_bbox().then(|| opts.bounds.bbox());

    let rows = state.store.spawnpoints(bbox).await?;
    let row_count = rows.len();

    let has_altitudes = {
        let mut registry = state.registry.write().await;
        registry.load(rows, opts);
        tracing::info!(
            "Loaded {} spawn rows: {} known, {} unknown",
            row_count,
            registry.len(),
            registry.unknown_count()
        );
        if registry.is_empty() {
            tracing::warn!("No spawns with a known despawn time in the database");
        }
        registry.has_altitudes()
    };

    if !has_altitudes {
        refresh_altitudes(state).await?;
    }
    Ok(())
}

/// Replace the altitude cache.
///
/// Stored altitudes on the current precision grid are used when available.
/// Otherwise the map grid is fetched from the elevation source and stored.
/// Maps whose lattice exceeds `MAX_PREFETCH_POINTS` are not prefetched;
/// their altitudes are fetched one location at a time on demand.
pub async fn refresh_altitudes(state: &AppState) -> Result<(), AppError> {
    let precision = state.settings.alt_precision;

    let mut altitudes: HashMap<Point, f64> = state
        .store
        .altitudes()
        .await?
        .into_iter()
        .filter(|(point, _)| round_coords(*point, precision) == *point)
        .collect();

    if altitudes.is_empty() {
        match state.settings.bounds.grid(precision, altitude::MAX_PREFETCH_POINTS) {
            Some(grid) => {
                altitudes = altitude::prefetch_altitudes(state.elevation.as_ref(), &grid).await;
                if !altitudes.is_empty() {
                    state.store.store_altitudes(&altitudes).await?;
                }
            }
            None => tracing::warn!(
                "Altitude grid has {} points at precision {} (limit {}), skipping prefetch",
                state.settings.bounds.grid_len(precision),
                precision,
                altitude::MAX_PREFETCH_POINTS
            ),
        }
    }

    tracing::info!("Altitude cache holds {} locations", altitudes.len());
    state.registry.write().await.replace_altitudes(altitudes);
    Ok(())
}

/// Start-up path: use the snapshot when it is still valid, the database otherwise.
pub async fn restore_or_reload(state: &AppState) -> Result<(), AppError> {
    match snapshot::restore(&state.snapshot_path, &state.settings).await? {
        Restored::Loaded {
            registry,
            altitudes_stale,
        } => {
            tracing::info!(
                "Restored {} spawns and {} unknown points from snapshot",
                registry.len(),
                registry.unknown_count()
            );
            *state.registry.write().await = registry;
            if altitudes_stale {
                refresh_altitudes(state).await?;
            }
            Ok(())
        }
        Restored::Rejected => {
            *state.registry.write().await = SpawnRegistry::new(state.settings.mode);
            reload(state).await
        }
    }
}

pub async fn save_snapshot(state: &AppState) -> Result<(), AppError> {
    snapshot::save(&state.snapshot_path, &state.registry, &state.settings).await?;
    Ok(())
}

/// Record a spawn with a confirmed despawn second.
///
/// The sighting is written to the database first so a crash never leaves
/// the registry ahead of storage.
///
/// # Errors
///
/// - `InvalidRequest`: despawn second outside 0..3600 or coordinates out of range
/// - `Database`: Database error occurred
pub async fn record_known(state: &AppState, request: KnownSpawnRequest) -> Result<(), AppError> {
    if !(0..3600).contains(&request.despawn_time) {
        return Err(AppError::InvalidRequest(
            "despawn_time must be between 0 and 3599".to_string(),
        ));
    }
    let point = validate_point(request.point())?;

    let spawn = Spawnpoint {
        spawn_id: request.spawn_id,
        despawn_time: request.despawn_time,
        lat: point.lat,
        lon: point.lon,
        alt: None,
        updated: Some(now_epoch()),
        duration: request.duration,
    };
    state.store.upsert_spawnpoint(&spawn).await?;

    state
        .registry
        .write()
        .await
        .add_known(request.spawn_id, request.despawn_time, point);
    Ok(())
}

/// Reject coordinates that cannot exist on a map.
pub fn validate_point(point: Point) -> Result<Point, AppError> {
    if !point.lat.is_finite() || !(-90.0..=90.0).contains(&point.lat) {
        return Err(AppError::InvalidRequest("lat must be within -90..90".to_string()));
    }
    if !point.lon.is_finite() || !(-180.0..=180.0).contains(&point.lon) {
        return Err(AppError::InvalidRequest("lon must be within -180..180".to_string()));
    }
    Ok(point)
}
