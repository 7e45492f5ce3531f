// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UTC bucket arithmetic shared by the buffer, the store, and the jobs.
//!
//! All timestamps are Unix seconds, so bucket boundaries fall on UTC
//! midnight and on UTC hour marks.

use chrono::{DateTime, Utc};

pub const SECONDS_PER_HOUR: i64 = 3_600;
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Current time as Unix seconds.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Start of the UTC day containing `ts`.
pub fn day_bucket(ts: i64) -> i64 {
    ts - ts.rem_euclid(SECONDS_PER_DAY)
}

/// Start of the UTC hour containing `ts`.
pub fn hour_bucket(ts: i64) -> i64 {
    ts - ts.rem_euclid(SECONDS_PER_HOUR)
}

/// Hour of the UTC day (0..=23) containing `ts`.
pub fn hour_of_day(ts: i64) -> u8 {
    (ts.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR) as u8
}

/// Timestamp `days` whole days before `now`.
pub fn days_ago(now: i64, days: i64) -> i64 {
    now - days.saturating_mul(SECONDS_PER_DAY)
}

/// Convert a Unix timestamp to a UTC datetime, clamping out-of-range values to the epoch.
pub fn to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
