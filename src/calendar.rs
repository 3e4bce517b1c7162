//! Trading-day arithmetic for the cash market.
//!
//! Weekends are the only non-trading days; exchange holidays are not modelled.
//! A holiday therefore looks like a missing file and is handled by the
//! backward search in [`crate::pipeline`].

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Upper bound on the backward walk in [`previous_trading_day`].
pub const MAX_BACKWARD_STEPS: u32 = 7;

/// Returns `true` for Monday through Friday.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Returns the closest trading day strictly before `date`.
///
/// Steps back one calendar day at a time. With a weekday-only calendar the
/// walk needs at most three steps, and it never exceeds [`MAX_BACKWARD_STEPS`].
pub fn previous_trading_day(date: NaiveDate) -> NaiveDate {
    let mut candidate = date;
    for _ in 0..MAX_BACKWARD_STEPS {
        candidate -= Duration::days(1);
        if is_trading_day(candidate) {
            return candidate;
        }
    }
    candidate
}

/// Returns `date` itself when it is a trading day, otherwise the previous one.
pub fn latest_trading_day_on_or_before(date: NaiveDate) -> NaiveDate {
    if is_trading_day(date) {
        date
    } else {
        previous_trading_day(date)
    }
}

/// Trading days among the `days` calendar days ending at `end` (inclusive),
/// oldest first.
pub fn trading_days_in_window(end: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days))
        .rev()
        .map(|offset| end - Duration::days(offset))
        .filter(|date| is_trading_day(*date))
        .collect()
}
