//! Spawn Registry Service - Main Application Entry Point
//!
//! This is a REST API server that keeps track of map spawn points for scanning workers: which points spawn at
//! which second of the hour, which points still need their timing discovered, and the altitude of every location.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Registry**: In-memory index behind a tokio `RwLock`, snapshotted to disk
//! - **Altitudes**: Google Maps Elevation API with random fallback
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Restore the registry snapshot, or load spawns from the database
//! 5. Build HTTP router with routes and middleware
//! 6. Serve until Ctrl-C, then save the snapshot

mod bounds;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::db::PgStore;
use crate::services::{
    altitude::GoogleElevation, registry_service, snapshot::SNAPSHOT_FILE, spawns::SpawnRegistry,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Step 1: Initialize tracing/logging
    // Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Step 2: Load configuration from environment
    let config = config::Config::from_env()?;
    let settings = Arc::new(config.spawn_settings()?);
    tracing::info!("Configuration loaded ({:?} registry)", settings.mode);

    // Step 3: Create database connection pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Step 4: Run database migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let elevation = GoogleElevation::new(config.elevation_url.clone(), config.google_maps_key.clone())?;
    if config.google_maps_key.is_none() {
        tracing::warn!("GOOGLE_MAPS_KEY not set, altitudes will be random");
    }

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        registry: Arc::new(RwLock::new(SpawnRegistry::new(settings.mode))),
        elevation: Arc::new(elevation),
        settings,
        snapshot_path: PathBuf::from(&config.snapshot_dir).join(SNAPSHOT_FILE),
        api_token_hash: config.api_token_hash.clone(),
    };

    // Step 5: Restore the registry snapshot, or load spawns from the database
    registry_service::restore_or_reload(&state).await?;

    // Step 6: Build HTTP router
    let app = build_router(state.clone());

    // Step 7: Start HTTP server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Step 8: Persist the registry for the next start
    tracing::info!("Shutting down, saving spawn snapshot");
    registry_service::save_snapshot(&state).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    // Write routes require the bearer token when one is configured
    let authenticated_routes = Router::new()
        .route("/api/v1/spawns/known", post(handlers::spawns::add_known))
        .route("/api/v1/spawns/unknown", post(handlers::spawns::add_unknown))
        .route(
            "/api/v1/spawns/cell_points",
            post(handlers::spawns::add_cell_point),
        )
        .route("/api/v1/spawns/reload", post(handlers::spawns::reload))
        .route(
            "/api/v1/spawns/snapshot",
            post(handlers::spawns::save_snapshot),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Public read routes, merged with the write routes
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/spawns", get(handlers::spawns::get_stats))
        .route(
            "/api/v1/spawns/schedule",
            get(handlers::spawns::list_schedule),
        )
        .route(
            "/api/v1/spawns/mysteries",
            get(handlers::spawns::list_mysteries),
        )
        .route("/api/v1/spawns/have", get(handlers::spawns::have_point))
        .route(
            "/api/v1/spawns/{spawn_id}/despawn",
            get(handlers::spawns::get_despawn_time),
        )
        .route("/api/v1/altitude", get(handlers::altitude::get_altitude))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::MemoryStore;
    use crate::models::point::Point;
    use crate::services::{altitude::tests::FakeElevation, spawns::RegistryMode};
    use crate::state::tests::{settings, test_state};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const TOKEN: &str = "letmein";

    fn state(mode: RegistryMode, api_token_hash: Option<String>) -> AppState {
        let mut state = test_state(
            settings(mode),
            Arc::new(MemoryStore::default()),
            Arc::new(FakeElevation::default()),
            PathBuf::from("unused").join(SNAPSHOT_FILE),
        );
        state.api_token_hash = api_token_hash;
        state
    }

    async fn send(state: &AppState, request: Request<Body>) -> Response {
        build_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn stats_start_empty() {
        let state = state(RegistryMode::Standard, None);
        let response = send(&state, get("/api/v1/spawns")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["known"], 0);
        assert_eq!(body["total"], 0);
        assert_eq!(body["after_last"], false);
    }

    #[tokio::test]
    async fn despawn_time_for_known_spawn() {
        let state = state(RegistryMode::Standard, None);
        state
            .registry
            .write()
            .await
            .add_known(42, 1250, Point::new(1.0, 1.0));

        let response = send(&state, get("/api/v1/spawns/42/despawn?seen=7300")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["despawn_time"], 7200 + 1250);

        let missing = send(&state, get("/api/v1/spawns/43/despawn?seen=7300")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(missing).await["error"]["code"], "spawn_not_found");
    }

    #[tokio::test]
    async fn write_routes_require_token_when_configured() {
        let state = state(RegistryMode::Standard, Some(middleware::auth::hash_token(TOKEN)));
        let body = serde_json::json!({"lat": 2.5, "lon": 3.5});

        let anonymous = send(&state, post_json("/api/v1/spawns/unknown", body.clone(), None)).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let wrong = send(
            &state,
            post_json("/api/v1/spawns/unknown", body.clone(), Some("nope")),
        )
        .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = send(&state, post_json("/api/v1/spawns/unknown", body, Some(TOKEN))).await;
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);

        let mysteries = json(send(&state, get("/api/v1/spawns/mysteries")).await).await;
        assert_eq!(mysteries, serde_json::json!([[2.5, 3.5]]));

        // reads stay public
        let have = send(&state, get("/api/v1/spawns/have?lat=2.5&lon=3.5")).await;
        assert_eq!(json(have).await["have"], true);
    }

    #[tokio::test]
    async fn rejects_invalid_coordinates() {
        let state = state(RegistryMode::Standard, None);
        let response = send(
            &state,
            post_json(
                "/api/v1/spawns/unknown",
                serde_json::json!({"lat": 95.0, "lon": 0.0}),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cell_points_only_added_once() {
        let state = state(RegistryMode::MorePoints, None);
        let body = serde_json::json!({"lat": 4.0, "lon": 4.0});

        let first = send(&state, post_json("/api/v1/spawns/cell_points", body.clone(), None)).await;
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = send(&state, post_json("/api/v1/spawns/cell_points", body, None)).await;
        assert_eq!(second.status(), StatusCode::OK);

        let stats = json(send(&state, get("/api/v1/spawns")).await).await;
        assert_eq!(stats["cells"], 1);
        assert_eq!(stats["total"], 1);
    }

    #[tokio::test]
    async fn known_list_is_ordered() {
        let state = state(RegistryMode::Standard, None);
        {
            let settings = state.settings.clone();
            let mut registry = state.registry.write().await;
            let rows = [(1i64, 3000), (2, 100)].map(|(spawn_id, despawn_time)| {
                crate::models::spawnpoint::Spawnpoint {
                    spawn_id,
                    despawn_time,
                    lat: spawn_id as f64,
                    lon: 1.0,
                    alt: None,
                    updated: Some(10),
                    duration: Some(60),
                }
            });
            registry.load(rows, registry_service::load_options(&settings));
        }

        let body = json(send(&state, get("/api/v1/spawns/schedule")).await).await;
        assert_eq!(body[0]["spawn_id"], 2);
        assert_eq!(body[1]["spawn_id"], 1);
        assert_eq!(body[1]["spawn_seconds"], 3000);
    }

    #[tokio::test]
    async fn altitude_uses_elevation_source() {
        let state = state(RegistryMode::Standard, None);
        let response = send(&state, get("/api/v1/altitude?lat=1.004&lon=2.0")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["altitude"], 3.0);
    }

    #[tokio::test]
    async fn altitude_rejects_unusable_randomize() {
        let state = state(RegistryMode::Standard, None);
        state
            .registry
            .write()
            .await
            .set_altitude(Point::new(1.0, 1.0), 100.0);

        for randomize in ["NaN", "inf", "1e308"] {
            let uri = format!("/api/v1/altitude?lat=1&lon=1&randomize={randomize}");
            let response = send(&state, get(&uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "randomize={randomize}");
        }

        let ok = json(send(&state, get("/api/v1/altitude?lat=1&lon=1&randomize=5")).await).await;
        let altitude = ok["altitude"].as_f64().unwrap();
        assert!((95.0..=105.0).contains(&altitude));
    }

    #[tokio::test]
    async fn despawn_rejects_out_of_range_sighting() {
        let state = state(RegistryMode::Standard, None);
        state
            .registry
            .write()
            .await
            .add_known(42, 1250, Point::new(1.0, 1.0));

        let uri = format!("/api/v1/spawns/42/despawn?seen={}", i64::MAX);
        let overflow = send(&state, get(&uri)).await;
        assert_eq!(overflow.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(overflow).await["error"]["code"], "invalid_request");

        let negative = send(&state, get("/api/v1/spawns/42/despawn?seen=-5")).await;
        assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/api/v1/spawns/42/despawn?seen={}", handlers::spawns::MAX_SEEN);
        assert_eq!(send(&state, get(&uri)).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_registry_size() {
        let state = state(RegistryMode::Standard, None);
        state
            .registry
            .write()
            .await
            .add_unknown(Point::new(1.0, 1.0));

        let response = send(&state, get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["database"], "connected");
        assert_eq!(body["total_points"], 1);
    }

    #[tokio::test]
    async fn reload_loads_spawns_from_store() {
        let store = Arc::new(MemoryStore::with_spawns(vec![
            crate::models::spawnpoint::Spawnpoint {
                spawn_id: 5,
                despawn_time: 600,
                lat: 2.0,
                lon: 2.0,
                alt: Some(12.0),
                updated: Some(10),
                duration: None,
            },
        ]));
        let state = test_state(
            settings(RegistryMode::Standard),
            store,
            Arc::new(FakeElevation::default()),
            PathBuf::from("unused").join(SNAPSHOT_FILE),
        );

        let response = send(&state, post_json("/api/v1/spawns/reload", Value::Null, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["known"], 1);

        let schedule = json(send(&state, get("/api/v1/spawns/schedule")).await).await;
        assert_eq!(schedule[0]["spawn_seconds"], 2400);
    }
}
