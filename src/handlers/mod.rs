//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Reads or updates the spawn registry through the shared state
//! 3. Returns HTTP response (JSON, status code)

/// Altitude lookups
pub mod altitude;
/// Service monitoring
pub mod health;
/// Spawn registry endpoints
pub mod spawns;
