//! Business logic services.
//!
//! The spawn registry itself is pure state; the other services feed it
//! from the database, the elevation API and snapshots on disk.

pub mod altitude;
pub mod registry_service;
pub mod snapshot;
pub mod spawns;
