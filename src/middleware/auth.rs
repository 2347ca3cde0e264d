//! Bearer token authentication for write routes.
//!
//! When `API_TOKEN_HASH` is configured, this middleware:
//! 1. Extracts the token from the Authorization header
//! 2. Hashes it with SHA-256
//! 3. Compares the digest with the configured hash
//! 4. Rejects mismatches with HTTP 401
//!
//! Without a configured hash every request passes through.

use crate::{error::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of a raw token, the format expected in `API_TOKEN_HASH`.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Token authentication middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if no token is configured or the token matches
/// - `Err(AppError::Unauthorized)` otherwise (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Open access when no token is configured
    let Some(expected) = state.api_token_hash.as_deref() else {
        return Ok(next.run(request).await);
    };

    // Step 2: Extract Bearer token from the Authorization header
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    // Step 3: Compare the token's SHA-256 with the configured hash
    if !hash_token(token).eq_ignore_ascii_case(expected.trim()) {
        tracing::warn!("Rejected request with invalid API token");
        return Err(AppError::Unauthorized);
    }

    // Step 4: Call the next middleware/handler
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_to_lowercase_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
