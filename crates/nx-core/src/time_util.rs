//! Time utilities.
//!
//! The feed encodes times as 32-bit epoch seconds; local receive stamps are
//! microseconds since the Unix epoch.

use chrono::{DateTime, Utc};

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0)
}

/// Convert wire epoch seconds into a UTC timestamp.
///
/// Returns `None` for values chrono cannot represent.
#[inline]
pub fn epoch_secs_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
