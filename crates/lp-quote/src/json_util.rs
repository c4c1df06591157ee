//! JSON field helpers for quote payloads.
//!
//! The server encodes decimals as strings (`"320.200"`) to keep precision and
//! integers as either strings or numbers depending on the field, so every
//! accessor accepts both.

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s.trim()).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `i64`.
#[inline]
pub fn parse_str_i64(v: Option<&serde_json::Value>) -> Option<i64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.trim().parse().ok()
    } else {
        v.as_i64()
    }
}

/// Named `f64` field, defaulting to `0.0` when absent or empty.
#[inline]
pub fn f64_field_or_zero(v: &serde_json::Value, key: &str) -> f64 {
    parse_str_f64(v.get(key)).unwrap_or(0.0)
}

/// Named `i64` field, defaulting to `0` when absent.
#[inline]
pub fn i64_field_or_zero(v: &serde_json::Value, key: &str) -> i64 {
    parse_str_i64(v.get(key)).unwrap_or(0)
}
