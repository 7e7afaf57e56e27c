//! Business-day calendar helpers.
//!
//! Only Mon-Fri are first-class observation dates. There are deliberately no
//! date-specific constants here: weekend and gap handling is the uniform
//! "last known trading-day value" rule applied by the backfill engine.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Most recent business day on or before `date`.
pub fn business_day_on_or_before(date: NaiveDate) -> NaiveDate {
    let mut current = date;
    while !is_business_day(current) {
        current -= Duration::days(1);
    }
    current
}

/// The business day strictly before `date`.
pub fn prev_business_day(date: NaiveDate) -> NaiveDate {
    business_day_on_or_before(date - Duration::days(1))
}

/// The business day strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut current = date + Duration::days(1);
    while !is_business_day(current) {
        current += Duration::days(1);
    }
    current
}

/// The `n` business days strictly before `date`, ascending.
pub fn business_days_back(date: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut current = date;
    for _ in 0..n {
        current = prev_business_day(current);
        days.push(current);
    }
    days.reverse();
    days
}

/// All business days in `[from, to]`, ascending. Empty when `from > to`.
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = from;
    while current <= to {
        if is_business_day(current) {
            days.push(current);
        }
        current += Duration::days(1);
    }
    days
}
