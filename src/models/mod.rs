//! Data models shared by the registry, the database layer and the API.
//!
//! - `point`: map coordinates
//! - `spawnpoint`: database rows and API request/response bodies

pub mod point;
pub mod spawnpoint;
