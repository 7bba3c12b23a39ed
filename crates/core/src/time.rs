//! Wall-clock helpers.
//!
//! Timestamps travel between nodes as Unix seconds in `f64`, and several
//! signed messages embed them as text. Legacy nodes render those floats with
//! the shortest round-trip decimal and always keep a fractional part, so
//! `1700000000.0` is framed as `"1700000000.0"`, never `"1700000000"`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in (fractional) seconds.
pub type Timestamp = f64;

/// Seconds in one day.
pub const SECS_PER_DAY: f64 = 86_400.0;

/// Seconds in one hour.
pub const SECS_PER_HOUR: f64 = 3_600.0;

/// Current wall-clock time as Unix seconds.
///
/// A clock set before the epoch reads as `0.0`, which every freshness check
/// in the workspace treats as stale.
pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Current wall-clock time in nanoseconds, used as extra entropy for nonces.
pub fn unix_now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Render a timestamp exactly as legacy peers frame it in signed messages.
pub fn legacy_timestamp(ts: Timestamp) -> String {
    if ts.is_finite() && ts.fract() == 0.0 {
        format!("{:.1}", ts)
    } else {
        format!("{}", ts)
    }
}

/// Render an arbitrary float field with the same rule as [`legacy_timestamp`].
pub fn legacy_float(value: f64) -> String {
    legacy_timestamp(value)
}
