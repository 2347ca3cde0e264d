//! Database connection pool, migrations and spawn point queries.
//!
//! This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running database migrations automatically
//! - Reading and writing the `spawnpoints` and `altitudes` tables

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};
use std::collections::HashMap;

use crate::bounds::BoundingBox;
use crate::models::point::Point;
use crate::models::spawnpoint::{AltitudeRow, Spawnpoint};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Rows per multi-row INSERT, keeps bind parameters under the Postgres limit.
const INSERT_CHUNK: usize = 1000;

/// Create a new PostgreSQL connection pool.
///
/// # Configuration
///
/// - Maximum connections: 5
/// - Connections are created lazily as needed
///
/// # Errors
///
/// Returns an error if:
/// - Database connection string is invalid
/// - Cannot connect to PostgreSQL server
/// - Database authentication fails
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        // The registry keeps its state in memory, a small pool is enough
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // Migration files are embedded into the binary at compile time
    sqlx::migrate!("./migrations").run(pool).await
}

/// Storage the spawn registry is loaded from and written back to.
///
/// `PgStore` is the production backend; the registry services only see
/// this trait.
#[async_trait]
pub trait SpawnStore: Send + Sync {
    /// Cheap connectivity check
    async fn ping(&self) -> Result<(), sqlx::Error>;

    async fn spawnpoints(&self, bbox: Option<BoundingBox>) -> Result<Vec<Spawnpoint>, sqlx::Error>;

    async fn upsert_spawnpoint(&self, spawn: &Spawnpoint) -> Result<(), sqlx::Error>;

    async fn altitudes(&self) -> Result<HashMap<Point, f64>, sqlx::Error>;

    async fn store_altitudes(&self, altitudes: &HashMap<Point, f64>) -> Result<(), sqlx::Error>;
}

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpawnStore for PgStore {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        // Verify database connectivity with simple query
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn spawnpoints(&self, bbox: Option<BoundingBox>) -> Result<Vec<Spawnpoint>, sqlx::Error> {
        fetch_spawnpoints(&self.pool, bbox).await
    }

    async fn upsert_spawnpoint(&self, spawn: &Spawnpoint) -> Result<(), sqlx::Error> {
        upsert_spawnpoint(&self.pool, spawn).await
    }

    async fn altitudes(&self) -> Result<HashMap<Point, f64>, sqlx::Error> {
        fetch_altitudes(&self.pool).await
    }

    async fn store_altitudes(&self, altitudes: &HashMap<Point, f64>) -> Result<(), sqlx::Error> {
        store_altitudes(&self.pool, altitudes).await
    }
}

/// Fetch spawn points, optionally limited to a bounding box.
pub async fn fetch_spawnpoints(
    pool: &DbPool,
    bbox: Option<BoundingBox>,
) -> Result<Vec<Spawnpoint>, sqlx::Error> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT spawn_id, despawn_time, lat, lon, alt, updated, duration FROM spawnpoints",
    );

    // Cheap box filter, exact polygon containment happens in memory
    if let Some(bbox) = bbox {
        query
            .push(" WHERE lat >= ")
            .push_bind(bbox.south)
            .push(" AND lat <= ")
            .push_bind(bbox.north)
            .push(" AND lon >= ")
            .push_bind(bbox.west)
            .push(" AND lon <= ")
            .push_bind(bbox.east);
    }

    query.build_query_as::<Spawnpoint>().fetch_all(pool).await
}

/// Insert a spawn point or refresh its timing.
///
/// A stored altitude is kept when the new sighting carries none.
pub async fn upsert_spawnpoint(pool: &DbPool, spawn: &Spawnpoint) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO spawnpoints (spawn_id, despawn_time, lat, lon, alt, updated, duration)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (spawn_id) DO UPDATE SET
            despawn_time = EXCLUDED.despawn_time,
            lat = EXCLUDED.lat,
            lon = EXCLUDED.lon,
            alt = COALESCE(EXCLUDED.alt, spawnpoints.alt),
            updated = EXCLUDED.updated,
            duration = COALESCE(EXCLUDED.duration, spawnpoints.duration)
        "#,
    )
    .bind(spawn.spawn_id)
    .bind(spawn.despawn_time)
    .bind(spawn.lat)
    .bind(spawn.lon)
    .bind(spawn.alt)
    .bind(spawn.updated)
    .bind(spawn.duration)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the persisted altitude cache.
pub async fn fetch_altitudes(pool: &DbPool) -> Result<HashMap<Point, f64>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AltitudeRow>("SELECT lat, lon, altitude FROM altitudes")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (Point::new(row.lat, row.lon), row.altitude))
        .collect())
}

/// Persist altitudes, overwriting existing values for the same location.
pub async fn store_altitudes(
    pool: &DbPool,
    altitudes: &HashMap<Point, f64>,
) -> Result<(), sqlx::Error> {
    let rows: Vec<(&Point, &f64)> = altitudes.iter().collect();
    let mut tx = pool.begin().await?;

    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO altitudes (lat, lon, altitude) ");
        query.push_values(chunk, |mut b, (point, altitude)| {
            b.push_bind(point.lat).push_bind(point.lon).push_bind(**altitude);
        });
        query.push(" ON CONFLICT (lat, lon) DO UPDATE SET altitude = EXCLUDED.altitude");
        query.build().execute(&mut *tx).await?;
    }

    tx.commit().await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory store mirroring the two tables.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub spawns: Mutex<Vec<Spawnpoint>>,
        pub altitudes: Mutex<HashMap<Point, f64>>,
    }

    impl MemoryStore {
        pub fn with_spawns(spawns: Vec<Spawnpoint>) -> Self {
            Self {
                spawns: Mutex::new(spawns),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SpawnStore for MemoryStore {
        async fn ping(&self) -> Result<(), sqlx::Error> {
            Ok(())
        }

        async fn spawnpoints(
            &self,
            bbox: Option<BoundingBox>,
        ) -> Result<Vec<Spawnpoint>, sqlx::Error> {
            let spawns = self.spawns.lock().unwrap();
            Ok(spawns
                .iter()
                .filter(|s| bbox.is_none_or(|b| b.contains(s.point())))
                .cloned()
                .collect())
        }

        async fn upsert_spawnpoint(&self, spawn: &Spawnpoint) -> Result<(), sqlx::Error> {
            let mut spawns = self.spawns.lock().unwrap();
            spawns.retain(|s| s.spawn_id != spawn.spawn_id);
            spawns.push(spawn.clone());
            Ok(())
        }

        async fn altitudes(&self) -> Result<HashMap<Point, f64>, sqlx::Error> {
            Ok(self.altitudes.lock().unwrap().clone())
        }

        async fn store_altitudes(
            &self,
            altitudes: &HashMap<Point, f64>,
        ) -> Result<(), sqlx::Error> {
            self.altitudes.lock().unwrap().extend(altitudes.iter().map(|(p, a)| (*p, *a)));
            Ok(())
        }
    }

    fn spawn(spawn_id: i64, lat: f64) -> Spawnpoint {
        Spawnpoint {
            spawn_id,
            despawn_time: 100,
            lat,
            lon: 1.0,
            alt: None,
            updated: Some(1),
            duration: None,
        }
    }

    #[tokio::test]
    async fn memory_store_filters_by_bbox_and_upserts() {
        let store = MemoryStore::with_spawns(vec![spawn(1, 1.0), spawn(2, 50.0)]);
        let bbox = BoundingBox::from_corners(Point::new(0.0, 0.0), Point::new(10.0, 10.0));

        assert_eq!(store.spawnpoints(Some(bbox)).await.unwrap().len(), 1);
        assert_eq!(store.spawnpoints(None).await.unwrap().len(), 2);

        let mut moved = spawn(2, 5.0);
        moved.despawn_time = 900;
        store.upsert_spawnpoint(&moved).await.unwrap();
        let inside = store.spawnpoints(Some(bbox)).await.unwrap();
        assert_eq!(inside.len(), 2);
        assert!(inside.iter().any(|s| s.spawn_id == 2 && s.despawn_time == 900));
    }
}
