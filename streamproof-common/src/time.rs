//! Timestamp utilities
//!
//! Upstream history timestamps arrive as RFC 3339 strings; pagination
//! cursors are milliseconds since the Unix epoch.

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a UTC timestamp to milliseconds since the Unix epoch
pub fn epoch_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert milliseconds since the Unix epoch back to a UTC timestamp.
/// Returns `None` for values outside chrono's representable range.
pub fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse an upstream played-at timestamp.
///
/// The upstream API emits RFC 3339 with a trailing `Z`; anything that does
/// not parse is treated by callers as a malformed item.
pub fn parse_played_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
