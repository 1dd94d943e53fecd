//! Timestamp utilities

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Build a fixed offset from a minutes-east-of-UTC value.
///
/// Out-of-range offsets fall back to UTC rather than failing; rule
/// validation rejects them before they reach storage.
pub fn fixed_offset(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Calendar date of an instant in the given fixed offset.
///
/// Exception dates and recurrence end bounds compare against this date,
/// not against the raw instant, so a time-of-day edit to a rule does not
/// orphan an existing cancellation.
pub fn local_date(instant: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
    instant.with_timezone(&fixed_offset(offset_minutes)).date_naive()
}

/// Convert a wall-clock datetime in the given fixed offset back to UTC.
pub fn from_local(local: NaiveDateTime, offset_minutes: i32) -> DateTime<Utc> {
    let offset = fixed_offset(offset_minutes);
    let naive_utc = local - chrono::Duration::seconds(offset.local_minus_utc() as i64);
    DateTime::<Utc>::from_naive_utc_and_offset(naive_utc, Utc)
}
