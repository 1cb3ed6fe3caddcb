use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Truncate a timestamp to midnight UTC of its calendar day.
#[must_use]
pub fn beginning_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Unix timestamp of the calendar day containing `at`. Used as the day
/// component of activity and used-today keys.
#[must_use]
pub fn day_key(at: DateTime<Utc>) -> i64 {
    beginning_of_day(at).timestamp()
}

/// The same instant one calendar day earlier.
#[must_use]
pub fn previous_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at - Duration::days(1)
}
