//! HTTP middleware components.

/// Bearer token authentication for write routes
pub mod auth;
