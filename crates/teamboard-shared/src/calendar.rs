//! Calendar day keys.
//!
//! Days are compared as `YYYY-MM-DD` strings built from the *local* calendar
//! fields of an instant, never from a UTC rendering, so two instants on the
//! same local day share a key even when they straddle UTC midnight.

use chrono::{Datelike, NaiveDate, TimeZone};

use crate::error::ParseError;

/// Format a calendar date as its day key.
pub fn day_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// Parse a `YYYY-MM-DD` day key back into a date.
pub fn parse_day_key(key: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d")
        .map_err(|_| ParseError::InvalidDate(key.to_string()))
}

/// Local calendar date of an epoch-millis instant in `tz`.
///
/// Returns `None` only for instants chrono cannot represent.
pub fn local_date<Tz: TimeZone>(epoch_millis: i64, tz: &Tz) -> Option<NaiveDate> {
    tz.timestamp_millis_opt(epoch_millis)
        .earliest()
        .map(|dt| dt.date_naive())
}
