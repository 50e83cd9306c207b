//! The single place wall-clock time enters the engine. Every other module
//! takes timestamps as plain `i64` arguments so tests can pin them.

/// Current unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Age of `timestamp_ms` relative to `now_ms`, in fractional days. Negative
/// ages (clock skew, future timestamps) are clamped to zero.
pub fn age_days(timestamp_ms: i64, now_ms: i64) -> f64 {
    let age_ms = (now_ms - timestamp_ms).max(0) as f64;
    age_ms / (1000.0 * 60.0 * 60.0 * 24.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_days_is_zero_for_future_timestamps() {
        let now = 1_000_000_i64;
        assert_eq!(age_days(now + 10_000, now), 0.0);
    }

    #[test]
    fn age_days_converts_milliseconds() {
        let day_ms = 1000 * 60 * 60 * 24;
        let now = 10 * day_ms as i64;
        assert!((age_days(0, now) - 10.0).abs() < 1e-9);
    }
}
