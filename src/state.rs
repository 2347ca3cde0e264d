//! Shared application state handed to every HTTP handler.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    config::SpawnSettings, db::SpawnStore, services::altitude::ElevationSource,
    services::spawns::SpawnRegistry,
};

/// Registry guarded for concurrent handlers.
///
/// Locks are held only for in-memory work, never across database or
/// network calls.
pub type SharedRegistry = Arc<RwLock<SpawnRegistry>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SpawnStore>,
    pub registry: SharedRegistry,
    pub elevation: Arc<dyn ElevationSource>,
    pub settings: Arc<SpawnSettings>,

    /// Location of the registry snapshot file
    pub snapshot_path: PathBuf,

    /// Hex SHA-256 of the bearer token required by write routes, if any
    pub api_token_hash: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::db::tests::MemoryStore;
    use crate::models::point::Point;
    use crate::services::{altitude::tests::FakeElevation, spawns::RegistryMode};

    pub(crate) fn settings(mode: RegistryMode) -> SpawnSettings {
        SpawnSettings {
            bounds: Bounds::rectangle(Point::new(0.0, 0.0), Point::new(10.0, 10.0)),
            stay_within_map: true,
            last_migration: 0,
            alt_precision: 2,
            alt_range: (300.0, 400.0),
            mode,
            db_hash: "test".to_string(),
        }
    }

    /// State over an in-memory store and a fake elevation source.
    pub(crate) fn test_state(
        settings: SpawnSettings,
        store: Arc<MemoryStore>,
        elevation: Arc<FakeElevation>,
        snapshot_path: PathBuf,
    ) -> AppState {
        AppState {
            store,
            registry: Arc::new(RwLock::new(SpawnRegistry::new(settings.mode))),
            elevation,
            settings: Arc::new(settings),
            snapshot_path,
            api_token_hash: None,
        }
    }
}
