//! Time points and spans
//!
//! A time point names a calendar period ("2021", "2021/03", "2021/03/14",
//! "2021/w10", "today") or an instant ("now", unix seconds). Used as the start
//! of a range it contributes the period's first second; used as the end it
//! contributes the period's end (exclusive). A span ("7d", "2w", "month") is a
//! calendar-aware length measured back from the end of a range.

use crate::query::error::{QueryError, QueryResult};
use crate::query::range::StepUnit;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::str::FromStr;

/// A point in time as written by a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePoint {
    /// The current instant
    Now,
    /// An exact unix timestamp in seconds
    Instant(i64),
    /// The calendar day containing the current instant
    Today,
    /// The calendar day before today
    Yesterday,
    /// A calendar day
    Day(NaiveDate),
    /// An ISO week, identified by its Monday
    Week(NaiveDate),
    /// A calendar month
    Month { year: i32, month: u32 },
    /// A calendar year
    Year(i32),
}

impl TimePoint {
    /// `[start, end)` of the period this point denotes
    pub fn bounds(&self, now: i64) -> (i64, i64) {
        match *self {
            Self::Now => (now, now),
            Self::Instant(t) => (t, t),
            Self::Today => day_bounds(StepUnit::Day.truncate(now)),
            Self::Yesterday => day_bounds(StepUnit::Day.advance(StepUnit::Day.truncate(now), -1)),
            Self::Day(date) => day_bounds(midnight(date)),
            Self::Week(monday) => {
                let start = midnight(monday);
                (start, StepUnit::Week.advance(start, 1))
            }
            Self::Month { year, month } => {
                let start = NaiveDate::from_ymd_opt(year, month, 1)
                    .map(midnight)
                    .unwrap_or(now);
                (start, StepUnit::Month.advance(start, 1))
            }
            Self::Year(year) => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1)
                    .map(midnight)
                    .unwrap_or(now);
                (start, StepUnit::Year.advance(start, 1))
            }
        }
    }

    /// First second of the period
    pub fn start(&self, now: i64) -> i64 {
        self.bounds(now).0
    }

    /// End of the period (exclusive)
    pub fn end(&self, now: i64) -> i64 {
        self.bounds(now).1
    }
}

impl FromStr for TimePoint {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        let input = s.trim().to_lowercase();

        match input.as_str() {
            "now" => return Ok(Self::Now),
            "today" => return Ok(Self::Today),
            "yesterday" => return Ok(Self::Yesterday),
            _ => {}
        }

        let patterns = TimePointPatterns::new()?;

        if patterns.year.is_match(&input) {
            let year = parse_number(&input)?;
            return Ok(Self::Year(year));
        }

        if let Some(caps) = patterns.month.captures(&input) {
            let year = parse_number(&caps[1])?;
            let month = parse_number(&caps[2])?;
            if !(1..=12).contains(&month) {
                return Err(QueryError::range(format!("Invalid month in time point: {}", s)));
            }
            return Ok(Self::Month { year, month });
        }

        if let Some(caps) = patterns.day.captures(&input) {
            let date = NaiveDate::from_ymd_opt(
                parse_number(&caps[1])?,
                parse_number(&caps[2])?,
                parse_number(&caps[3])?,
            )
            .ok_or_else(|| QueryError::range(format!("Invalid date: {}", s)))?;
            return Ok(Self::Day(date));
        }

        if let Some(caps) = patterns.week.captures(&input) {
            let monday = NaiveDate::from_isoywd_opt(
                parse_number(&caps[1])?,
                parse_number(&caps[2])?,
                chrono::Weekday::Mon,
            )
            .ok_or_else(|| QueryError::range(format!("Invalid week: {}", s)))?;
            return Ok(Self::Week(monday));
        }

        if patterns.instant.is_match(&input) {
            return Ok(Self::Instant(parse_number(&input)?));
        }

        Err(QueryError::range(format!("Cannot parse time point: {}", s)))
    }
}

struct TimePointPatterns {
    year: Regex,
    month: Regex,
    day: Regex,
    week: Regex,
    instant: Regex,
}

impl TimePointPatterns {
    fn new() -> QueryResult<Self> {
        let compile =
            |re: &str| Regex::new(re).map_err(|e| QueryError::range(format!("Regex error: {}", e)));
        Ok(Self {
            year: compile(r"^\d{4}$")?,
            month: compile(r"^(\d{4})[/-](\d{1,2})$")?,
            day: compile(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})$")?,
            week: compile(r"^(\d{4})[/-]?w(\d{1,2})$")?,
            instant: compile(r"^-?\d+$")?,
        })
    }
}

/// A calendar-aware length: `count` steps of `unit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub count: u32,
    pub unit: StepUnit,
}

impl Span {
    pub fn new(count: u32, unit: StepUnit) -> Self {
        Self { count, unit }
    }

    /// The instant `self` before `end`
    pub fn before(&self, end: i64) -> i64 {
        self.unit.advance(end, -(self.count as i64))
    }
}

impl FromStr for Span {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        let input = s.trim().to_lowercase();

        // "7d", "2 weeks", "month"
        let re = Regex::new(r"^(\d+)?\s*([a-z]+)$")
            .map_err(|e| QueryError::range(format!("Regex error: {}", e)))?;

        let caps = re
            .captures(&input)
            .ok_or_else(|| QueryError::range(format!("Cannot parse span: {}", s)))?;

        let count = match caps.get(1) {
            Some(m) => parse_number(m.as_str())?,
            None => 1,
        };
        if count == 0 {
            return Err(QueryError::range(format!("Span must not be empty: {}", s)));
        }

        let unit = match &caps[2] {
            "d" | "day" | "days" => StepUnit::Day,
            "w" | "week" | "weeks" => StepUnit::Week,
            "m" | "month" | "months" => StepUnit::Month,
            "y" | "year" | "years" => StepUnit::Year,
            other => {
                return Err(QueryError::range(format!("Invalid span unit: {}", other)));
            }
        };

        Ok(Self { count, unit })
    }
}

fn parse_number<T: FromStr>(s: &str) -> QueryResult<T> {
    s.parse()
        .map_err(|_| QueryError::range(format!("Invalid number in time expression: {}", s)))
}

fn midnight(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp()
}

fn day_bounds(start: i64) -> (i64, i64) {
    (start, start + Duration::days(1).num_seconds())
}

/// Calendar date of a timestamp, if representable
pub(crate) fn date_of(timestamp: i64) -> Option<NaiveDate> {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => Some(dt.date_naive()),
        _ => None,
    }
}

/// Year of a timestamp, if representable
pub(crate) fn year_of(timestamp: i64) -> Option<i32> {
    date_of(timestamp).map(|d| d.year())
}
