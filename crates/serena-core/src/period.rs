//! Calendar-month usage periods.
//!
//! Counters are only meaningful relative to `last_reset_date`: a record whose
//! reset date falls in an earlier calendar month than today holds counts from
//! a finished period and must be read as zero.

use chrono::{Datelike, NaiveDate};

/// Whether counters last reset on `last_reset` belong to a month before `today`.
///
/// A reset date in the future (clock skew between writers) is never stale, so
/// the reset date can only move forward.
pub fn is_stale(last_reset: NaiveDate, today: NaiveDate) -> bool {
    (last_reset.year(), last_reset.month()) < (today.year(), today.month())
}

/// Counter value as seen from `today`.
pub fn effective_count(count: u32, last_reset: NaiveDate, today: NaiveDate) -> u32 {
    if is_stale(last_reset, today) {
        0
    } else {
        count
    }
}

/// `YYYY-MM` key of the period containing `date`.
pub fn period_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
