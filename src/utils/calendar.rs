use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Number of calendar days in `[start, end]`, counting both endpoints.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().abs() + 1
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) { 366 } else { 365 }
}

pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday to Friday dates in `[start, end]`.
pub fn working_days(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| is_working_day(*d))
        .count() as u32
}

/// Rounds half away from zero to `dp` decimal places.
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a monetary amount to cents.
pub fn money(value: Decimal) -> Decimal {
    round_dp(value, 2)
}

/// Elapsed hours between two timestamps, rounded to 2 decimals.
pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> Decimal {
    let millis = (to - from).num_milliseconds();
    round_dp(Decimal::from(millis) / Decimal::from(MILLIS_PER_HOUR), 2)
}
