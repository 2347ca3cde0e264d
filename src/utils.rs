//! Small helpers for coordinates and hourly spawn timing.

use rand::Rng;

use crate::models::point::Point;

/// Round both coordinates to `precision` decimal places.
pub fn round_coords(point: Point, precision: u32) -> Point {
    let scale = 10f64.powi(precision as i32);
    Point::new(
        (point.lat * scale).round() / scale,
        (point.lon * scale).round() / scale,
    )
}

/// Epoch second at which the hour containing `now` started.
pub fn current_hour(now: i64) -> i64 {
    // saturates at the far negative end instead of overflowing
    now.div_euclid(3600).saturating_mul(3600)
}

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Largest altitude jitter, in meters.
pub const MAX_JITTER: f64 = 1000.0;

/// Uniformly random altitude within the configured fallback range.
///
/// A degenerate or non-finite range yields its minimum (or 0 if that is
/// not finite either).
pub fn random_altitude((min, max): (f64, f64)) -> f64 {
    if !(max - min).is_finite() || min >= max {
        return if min.is_finite() { min } else { 0.0 };
    }
    rand::rng().random_range(min..=max)
}

/// Uniform jitter of `amount` meters around `altitude`, capped at `MAX_JITTER`.
pub fn jitter(altitude: f64, amount: f64) -> f64 {
    let amount = amount.abs();
    if amount == 0.0 || amount.is_nan() || !altitude.is_finite() {
        return altitude;
    }
    let amount = amount.min(MAX_JITTER);
    rand::rng().random_range(altitude - amount..=altitude + amount)
}
