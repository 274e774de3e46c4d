// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting window computation.
//!
//! A weekly update always reports on the previous completed Monday-Sunday
//! week, whichever day of the current week the job happens to run on.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

const SECONDS_PER_DAY: u64 = 86_400;

/// An inclusive range of calendar days, Monday through Sunday.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportingWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether a unix timestamp falls inside the window, judged by its
    /// calendar day in `tz`.
    pub fn contains_timestamp(&self, timestamp: i64, tz: &Tz) -> bool {
        DateTime::from_timestamp(timestamp, 0)
            .map(|at| self.contains(at.with_timezone(tz).date_naive()))
            .unwrap_or(false)
    }

    /// The first instant of the window's first day in `tz`.
    pub fn start_instant(&self, tz: &Tz) -> DateTime<Utc> {
        let midnight = self.start.and_time(NaiveTime::MIN);
        tz.from_local_datetime(&midnight)
            .earliest()
            .map(|at| at.with_timezone(&Utc))
            // Midnight can fall in a DST gap; the UTC reading is close enough.
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }
}

impl fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Get the Monday of the week containing the given date.
fn get_week_start(date: NaiveDate) -> NaiveDate {
    let days_from_monday = date.weekday().num_days_from_monday();
    date - Duration::days(days_from_monday as i64)
}

/// Compute the week before the one containing `now`, with day boundaries
/// taken in `tz`.
pub fn reporting_window(now: DateTime<Utc>, tz: &Tz) -> ReportingWindow {
    let today = now.with_timezone(tz).date_naive();
    let start = get_week_start(today) - Duration::days(7);
    ReportingWindow {
        start,
        end: start + Duration::days(6),
    }
}

/// Number of whole days (rounded up) between the start of the window and
/// `now`. This is how far back upstream data has to reach to cover the
/// window.
pub fn lookback_days(now: DateTime<Utc>, window: &ReportingWindow, tz: &Tz) -> u32 {
    let elapsed = (now - window.start_instant(tz)).num_seconds().max(0) as u64;
    elapsed.div_ceil(SECONDS_PER_DAY) as u32
}
