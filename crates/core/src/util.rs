use std::time::{SystemTime, UNIX_EPOCH};

/// Returns current unix epoch milliseconds, or 0 if the clock reads before the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
