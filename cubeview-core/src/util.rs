//! Numeric conversion utilities.
//!
//! These functions handle conversions between numeric types with explicit
//! handling of precision loss and bounds checking.

/// Convert usize to f64 with allowed precision loss.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    value as f64
}

/// Convert f32 to u8 with clamping to [0, 255].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn f32_to_u8(value: f32) -> u8 {
    let clamped = value.clamp(0.0, 255.0);
    clamped.round() as u8
}

/// Convert f64 to usize with bounds checking.
///
/// Returns `None` if the value is not finite, negative, or >= `max_exclusive`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn f64_to_usize_bounded(value: f64, max_exclusive: usize) -> Option<usize> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value >= usize_to_f64(max_exclusive) {
        return None;
    }
    Some(value as usize)
}

/// Round an f64 to the nearest i64, saturating at the type bounds.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn f64_to_i64_saturating(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    // `as` saturates for out-of-range floats.
    value.round() as i64
}

/// Round an f64 to the nearest u32, saturating at 0 and `u32::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn f64_to_u32_saturating(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.round() as u32
}
