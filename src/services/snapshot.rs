//! Registry snapshots.
//!
//! Loading every spawn point from the database and prefetching altitudes is
//! slow, so the registry is written to disk on shutdown and restored on the
//! next start. A snapshot is only trusted when it was taken against the same
//! database, the same map bounds and the same migration cutoff.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::SpawnSettings;
use crate::models::point::Point;
use crate::services::spawns::{KnownPoints, RegistryMode, SpawnRegistry};
use crate::state::SharedRegistry;

/// Bumped whenever the snapshot layout changes.
pub const CLASS_VERSION: u32 = 2;

pub const SNAPSHOT_FILE: &str = "spawns.json";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    class_version: u32,
    db_hash: String,
    bounds_hash: String,
    last_migration: i64,
    alt_precision: u32,
    known: KnownPoints,
    despawn_times: HashMap<i64, i32>,
    unknown: Vec<Point>,
    altitudes: Vec<(Point, f64)>,
    cell_points: Vec<Point>,
}

/// Result of reading a snapshot.
#[derive(Debug)]
pub enum Restored {
    Loaded {
        registry: SpawnRegistry,

        /// The altitude precision changed, cached altitudes were dropped
        altitudes_stale: bool,
    },
    Rejected,
}

impl Snapshot {
    fn capture(registry: &SpawnRegistry, settings: &SpawnSettings) -> Self {
        Self {
            class_version: CLASS_VERSION,
            db_hash: settings.db_hash.clone(),
            bounds_hash: settings.bounds.fingerprint(),
            last_migration: settings.last_migration,
            alt_precision: settings.alt_precision,
            known: registry.known.clone(),
            despawn_times: registry.despawn_times.clone(),
            unknown: registry.unknown.iter().copied().collect(),
            altitudes: registry.altitudes.iter().map(|(p, a)| (*p, *a)).collect(),
            cell_points: registry.cell_points.iter().copied().collect(),
        }
    }

    fn matches(&self, settings: &SpawnSettings) -> bool {
        self.class_version == CLASS_VERSION
            && self.db_hash == settings.db_hash
            && self.bounds_hash == settings.bounds.fingerprint()
            && self.last_migration == settings.last_migration
    }

    fn into_registry(self, mode: RegistryMode, alt_precision: u32) -> (SpawnRegistry, bool) {
        let altitudes_stale = self.alt_precision != alt_precision;

        let mut registry = SpawnRegistry::new(mode);
        registry.known = self.known;
        registry.despawn_times = self.despawn_times;
        registry.unknown = self.unknown.into_iter().collect();
        if !altitudes_stale {
            registry.altitudes = self.altitudes.into_iter().collect();
        }
        if mode == RegistryMode::MorePoints {
            registry.cell_points = self.cell_points.into_iter().collect();
        }
        (registry, altitudes_stale)
    }
}

/// Write the registry to `path`, replacing any previous snapshot atomically.
pub async fn save(
    path: &Path,
    registry: &SharedRegistry,
    settings: &SpawnSettings,
) -> Result<(), SnapshotError> {
    let bytes = {
        let registry = registry.read().await;
        serde_json::to_vec(&Snapshot::capture(&registry, settings))?
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::info!("Saved spawn snapshot to {}", path.display());
    Ok(())
}

/// Read a snapshot from `path` if it is still valid for `settings`.
///
/// # Errors
///
/// Only unexpected I/O failures are errors. A missing, outdated or
/// unreadable snapshot yields `Restored::Rejected` with a warning.
pub async fn restore(path: &Path, settings: &SpawnSettings) -> Result<Restored, SnapshotError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!("No spawns snapshot found, will create one.");
            return Ok(Restored::Rejected);
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Obsolete or invalid spawns snapshot ({}), reloading from DB.", e);
            return Ok(Restored::Rejected);
        }
    };

    if !snapshot.matches(settings) {
        tracing::warn!("Configuration changed, reloading spawns from DB.");
        return Ok(Restored::Rejected);
    }

    let (registry, altitudes_stale) = snapshot.into_registry(settings.mode, settings.alt_precision);
    if altitudes_stale {
        tracing::warn!("ALT_PRECISION changed, replacing altitudes.");
    }
    Ok(Restored::Loaded {
        registry,
        altitudes_stale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn settings(mode: RegistryMode) -> SpawnSettings {
        SpawnSettings {
            bounds: Bounds::rectangle(Point::new(0.0, 0.0), Point::new(10.0, 10.0)),
            stay_within_map: true,
            last_migration: 1_000,
            alt_precision: 2,
            alt_range: (300.0, 400.0),
            mode,
            db_hash: "abc".to_string(),
        }
    }

    fn populated() -> SharedRegistry {
        let mut registry = SpawnRegistry::new(RegistryMode::MorePoints);
        registry.add_known(7, 1200, Point::new(1.0, 1.0));
        registry.add_unknown(Point::new(2.0, 2.0));
        registry.add_cell_point(Point::new(3.0, 3.0));
        registry.set_altitude(Point::new(1.0, 1.0), 12.0);
        Arc::new(RwLock::new(registry))
    }

    #[tokio::test]
    async fn restores_saved_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SNAPSHOT_FILE);
        let settings = settings(RegistryMode::MorePoints);

        save(&path, &populated(), &settings).await.unwrap();

        let Restored::Loaded {
            registry,
            altitudes_stale,
        } = restore(&path, &settings).await.unwrap()
        else {
            panic!("snapshot should be accepted");
        };
        assert!(!altitudes_stale);
        assert_eq!(registry.get_despawn_time(7, 0), Some(1200));
        assert!(registry.have_point(&Point::new(1.0, 1.0)));
        assert_eq!(registry.unknown_count(), 1);
        assert_eq!(registry.cells_count(), 1);
        assert_eq!(registry.cached_altitude(&Point::new(1.0, 1.0)), Some(12.0));
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = restore(&dir.path().join(SNAPSHOT_FILE), &settings(RegistryMode::Standard))
            .await
            .unwrap();
        assert!(matches!(outcome, Restored::Rejected));
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        std::fs::write(&path, b"\x80\x04not json").unwrap();

        let outcome = restore(&path, &settings(RegistryMode::Standard)).await.unwrap();
        assert!(matches!(outcome, Restored::Rejected));
    }

    #[tokio::test]
    async fn changed_configuration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        let settings = settings(RegistryMode::Standard);
        save(&path, &populated(), &settings).await.unwrap();

        let mut moved = settings.clone();
        moved.bounds = Bounds::rectangle(Point::new(0.0, 0.0), Point::new(5.0, 5.0));
        assert!(matches!(restore(&path, &moved).await.unwrap(), Restored::Rejected));

        let mut migrated = settings.clone();
        migrated.last_migration = 2_000;
        assert!(matches!(restore(&path, &migrated).await.unwrap(), Restored::Rejected));

        let mut other_db = settings;
        other_db.db_hash = "def".to_string();
        assert!(matches!(restore(&path, &other_db).await.unwrap(), Restored::Rejected));
    }

    #[tokio::test]
    async fn precision_change_drops_altitudes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        save(&path, &populated(), &settings(RegistryMode::MorePoints)).await.unwrap();

        let mut finer = settings(RegistryMode::MorePoints);
        finer.alt_precision = 3;
        let Restored::Loaded {
            registry,
            altitudes_stale,
        } = restore(&path, &finer).await.unwrap()
        else {
            panic!("snapshot should be accepted");
        };
        assert!(altitudes_stale);
        assert!(!registry.has_altitudes());
    }

    #[tokio::test]
    async fn standard_mode_drops_cell_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        save(&path, &populated(), &settings(RegistryMode::Standard)).await.unwrap();

        let Restored::Loaded { registry, .. } = restore(&path, &settings(RegistryMode::Standard))
            .await
            .unwrap()
        else {
            panic!("snapshot should be accepted");
        };
        assert_eq!(registry.mode(), RegistryMode::Standard);
        assert!(!registry.have_point(&Point::new(3.0, 3.0)));
        assert_eq!(registry.total_length(), 2);
    }
}
