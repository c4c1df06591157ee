//! Time utilities.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

/// Request timestamp in the `seconds.millis` form the HTTP API expects
/// (e.g. `"1700000000.123"`).
pub fn request_timestamp() -> String {
    let ms = now_ms();
    format!("{}.{:03}", ms / 1_000, ms % 1_000)
}

/// Render epoch seconds as RFC 3339 UTC (`2023-11-14T22:13:20Z`).
///
/// Out-of-range values fall back to the raw number.
pub fn format_unix_secs(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_seconds() {
        assert_eq!(format_unix_secs(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_unix_secs(1_700_000_000), "2023-11-14T22:13:20Z");
        assert_eq!(format_unix_secs(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn request_timestamp_shape() {
        let ts = request_timestamp();
        let (secs, millis) = ts.split_once('.').unwrap();
        assert!(secs.parse::<u64>().unwrap() > 1_600_000_000);
        assert_eq!(millis.len(), 3);
    }
}
