use chrono::{DateTime, Utc};

const DAY_MS: i64 = 86_400_000;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Inclusive `[start, end]` bounds of the UTC calendar day containing `ms`.
pub fn utc_day_bounds(ms: i64) -> (i64, i64) {
    let start = match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().timestamp_millis())
            .unwrap_or_else(|| ms - ms.rem_euclid(DAY_MS)),
        None => ms - ms.rem_euclid(DAY_MS),
    };
    (start, start + DAY_MS - 1)
}
