//! Time-range resolution
//!
//! Turns user-facing range options into concrete half-open windows
//! `[since, to)` in unix seconds:
//!
//! - A single window for charts, lists and counts
//! - An ordered series of windows for pulse, performance and top queries
//!
//! The earliest event time is registered once at startup and bounds every
//! all-time window.

use crate::query::error::{QueryError, QueryResult};
use crate::query::timepoint::{Span, TimePoint};
use chrono::{Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Upper bound on the number of windows a single series may produce
pub const MAX_SERIES_WINDOWS: usize = 10_000;

/// Calendar step used by series queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepUnit {
    Day,
    Week,
    Month,
    Year,
}

impl StepUnit {
    /// Start of the period containing `timestamp` (weeks start on Monday)
    pub fn truncate(&self, timestamp: i64) -> i64 {
        let dt = match Utc.timestamp_opt(timestamp, 0) {
            chrono::LocalResult::Single(dt) => dt,
            _ => return timestamp,
        };
        let date = dt.date_naive();

        let start = match self {
            Self::Day => Some(date),
            Self::Week => {
                let days_since_monday = date.weekday().num_days_from_monday() as i64;
                Some(date - Duration::days(days_since_monday))
            }
            Self::Month => date.with_day(1),
            Self::Year => date.with_ordinal(1),
        };

        start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| Utc.from_utc_datetime(&d).timestamp())
            .unwrap_or(timestamp)
    }

    /// Move `timestamp` by `n` steps (negative moves backwards)
    ///
    /// Month and year steps clamp to the end of shorter months.
    pub fn advance(&self, timestamp: i64, n: i64) -> i64 {
        let dt = match Utc.timestamp_opt(timestamp, 0) {
            chrono::LocalResult::Single(dt) => dt,
            _ => return timestamp,
        };

        let shift_months = |months: i64| -> Option<chrono::DateTime<Utc>> {
            let amount = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
            if months >= 0 {
                dt.checked_add_months(amount)
            } else {
                dt.checked_sub_months(amount)
            }
        };

        let shifted = match self {
            Self::Day => dt.checked_add_signed(Duration::days(n)),
            Self::Week => dt.checked_add_signed(Duration::weeks(n)),
            Self::Month => shift_months(n),
            Self::Year => n.checked_mul(12).and_then(shift_months),
        };

        shifted.map(|d| d.timestamp()).unwrap_or(timestamp)
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" => Some(Self::Day),
            "week" | "w" => Some(Self::Week),
            "month" | "m" => Some(Self::Month),
            "year" | "y" => Some(Self::Year),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::Year => write!(f, "year"),
        }
    }
}

/// A resolved half-open window `[since, to)`
///
/// `open` marks windows whose end was "now" at resolution time; they are
/// dropped on every ingestion. A calendar period that is still running keeps
/// its real end and is not open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: i64,
    pub to: i64,
    #[serde(default)]
    pub open: bool,
}

impl TimeWindow {
    pub fn new(since: i64, to: i64) -> Self {
        Self {
            since,
            to,
            open: false,
        }
    }

    /// Window that runs up to `now` and keeps moving with it
    pub fn open_ended(since: i64, now: i64) -> Self {
        Self {
            since,
            to: now,
            open: true,
        }
    }

    pub fn contains(&self, time: i64) -> bool {
        self.since <= time && time < self.to
    }

    pub fn is_empty(&self) -> bool {
        self.since >= self.to
    }
}

/// Range options as accepted from callers
///
/// All fields are optional. Series options (`step`, `stepn`, `trail`) select a
/// series of windows; the others select one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeOptions {
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub within: Option<String>,
    #[serde(default)]
    pub timerange: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub stepn: Option<u32>,
    #[serde(default)]
    pub trail: Option<u32>,
}

impl RangeOptions {
    /// No options: the all-time window
    pub fn alltime() -> Self {
        Self::default()
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn within(mut self, within: impl Into<String>) -> Self {
        self.within = Some(within.into());
        self
    }

    pub fn timerange(mut self, timerange: impl Into<String>) -> Self {
        self.timerange = Some(timerange.into());
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn stepn(mut self, stepn: u32) -> Self {
        self.stepn = Some(stepn);
        self
    }

    pub fn trail(mut self, trail: u32) -> Self {
        self.trail = Some(trail);
        self
    }

    /// Whether any series option is present
    pub fn is_series(&self) -> bool {
        self.step.is_some() || self.stepn.is_some() || self.trail.is_some()
    }

    /// Validate and parse into a range request
    pub fn parse(&self) -> QueryResult<RangeRequest> {
        let since = parse_point(self.since.as_deref())?;
        let to = parse_point(self.to.as_deref())?;
        let timerange = parse_point(self.timerange.as_deref())?;
        let within = self.within.as_deref().map(str::parse::<Span>).transpose()?;

        let Some(step) = self.step.as_deref() else {
            if self.stepn.is_some() || self.trail.is_some() {
                return Err(QueryError::range("stepn and trail require step"));
            }
            return single_spec(since, to, within, timerange).map(RangeRequest::Single);
        };

        let step = StepUnit::from_str(step)
            .ok_or_else(|| QueryError::range(format!("Invalid step: {}", step)))?;

        if within.is_some() {
            return Err(QueryError::range("within cannot be combined with step"));
        }
        let (since, to) = match timerange {
            Some(_) if since.is_some() || to.is_some() => {
                return Err(QueryError::range(
                    "timerange cannot be combined with since or to",
                ));
            }
            Some(point) => (Some(point), Some(point)),
            None => (since, to),
        };
        if since.is_some() && self.stepn.is_some() {
            return Err(QueryError::range("since and stepn are mutually exclusive"));
        }
        if self.stepn == Some(0) {
            return Err(QueryError::range("stepn must be at least 1"));
        }
        let trail = self.trail.unwrap_or(1);
        if trail == 0 {
            return Err(QueryError::range("trail must be at least 1"));
        }

        Ok(RangeRequest::Series(SeriesSpec {
            step,
            stepn: self.stepn,
            trail,
            since,
            to,
        }))
    }
}

fn parse_point(value: Option<&str>) -> QueryResult<Option<TimePoint>> {
    value.map(str::parse::<TimePoint>).transpose()
}

fn single_spec(
    since: Option<TimePoint>,
    to: Option<TimePoint>,
    within: Option<Span>,
    timerange: Option<TimePoint>,
) -> QueryResult<RangeSpec> {
    if let Some(point) = timerange {
        if since.is_some() || to.is_some() || within.is_some() {
            return Err(QueryError::range(
                "timerange cannot be combined with since, to or within",
            ));
        }
        return Ok(RangeSpec::Calendar(point));
    }
    if let Some(span) = within {
        if since.is_some() {
            return Err(QueryError::range("since and within are mutually exclusive"));
        }
        return Ok(RangeSpec::Within { span, to });
    }
    if since.is_none() && to.is_none() {
        return Ok(RangeSpec::AllTime);
    }
    Ok(RangeSpec::Between { since, to })
}

/// A validated range request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeRequest {
    Single(RangeSpec),
    Series(SeriesSpec),
}

/// A single-window request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpec {
    /// From the first event up to now
    AllTime,
    /// Explicit bounds; a missing bound is the first event or now
    Between {
        since: Option<TimePoint>,
        to: Option<TimePoint>,
    },
    /// A span measured back from `to` (or now)
    Within { span: Span, to: Option<TimePoint> },
    /// Exactly one calendar period
    Calendar(TimePoint),
}

/// A series request: windows `trail` steps wide, one step apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub step: StepUnit,
    /// Number of windows; defaults to one unless `since` bounds the series
    pub stepn: Option<u32>,
    pub trail: u32,
    pub since: Option<TimePoint>,
    pub to: Option<TimePoint>,
}

impl SeriesSpec {
    pub fn new(step: StepUnit) -> Self {
        Self {
            step,
            stepn: None,
            trail: 1,
            since: None,
            to: None,
        }
    }
}

const FIRST_EVENT_UNSET: i64 = i64::MAX;

/// Resolves range requests against the current time and the first event
#[derive(Debug)]
pub struct TimeRangeResolver {
    first_event: AtomicI64,
}

impl Default for TimeRangeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeRangeResolver {
    pub fn new() -> Self {
        Self {
            first_event: AtomicI64::new(FIRST_EVENT_UNSET),
        }
    }

    /// Set the earliest event time (startup)
    pub fn register_first_event(&self, time: i64) {
        self.first_event.store(time, Ordering::SeqCst);
    }

    /// Lower the earliest event time if `time` precedes it
    pub fn note_event(&self, time: i64) {
        self.first_event.fetch_min(time, Ordering::SeqCst);
    }

    /// Earliest event time, or `now` when nothing was registered
    pub fn first_event(&self, now: i64) -> i64 {
        match self.first_event.load(Ordering::SeqCst) {
            FIRST_EVENT_UNSET => now,
            t => t,
        }
    }

    /// The all-time window
    pub fn alltime(&self) -> TimeWindow {
        self.alltime_at(Utc::now().timestamp())
    }

    pub fn alltime_at(&self, now: i64) -> TimeWindow {
        TimeWindow::open_ended(self.first_event(now).min(now), now)
    }

    /// Resolve options that must describe exactly one window
    pub fn window(&self, options: &RangeOptions) -> QueryResult<TimeWindow> {
        self.window_at(options, Utc::now().timestamp())
    }

    pub fn window_at(&self, options: &RangeOptions, now: i64) -> QueryResult<TimeWindow> {
        match options.parse()? {
            RangeRequest::Single(spec) => self.resolve_at(&spec, now),
            RangeRequest::Series(_) => Err(QueryError::range(
                "series options are not accepted for a single window",
            )),
        }
    }

    /// Resolve options into a series, most recent window first
    ///
    /// Single-window options become a monthly series covering that window.
    pub fn windows(&self, options: &RangeOptions) -> QueryResult<Vec<TimeWindow>> {
        self.windows_at(options, Utc::now().timestamp())
    }

    pub fn windows_at(&self, options: &RangeOptions, now: i64) -> QueryResult<Vec<TimeWindow>> {
        match options.parse()? {
            RangeRequest::Series(spec) => self.series_at(&spec, now),
            RangeRequest::Single(spec) => {
                let window = self.resolve_at(&spec, now)?;
                if window.is_empty() {
                    return Ok(Vec::new());
                }
                let spec = SeriesSpec {
                    since: Some(TimePoint::Instant(window.since)),
                    to: Some(TimePoint::Instant(window.to)),
                    ..SeriesSpec::new(StepUnit::Month)
                };
                self.series_at(&spec, now)
            }
        }
    }

    /// Resolve a single-window spec
    pub fn resolve_at(&self, spec: &RangeSpec, now: i64) -> QueryResult<TimeWindow> {
        let window = match spec {
            RangeSpec::AllTime => self.alltime_at(now),
            RangeSpec::Between { since, to } => {
                let start = since
                    .map(|p| p.start(now))
                    .unwrap_or_else(|| self.first_event(now).min(now));
                end_window(start, *to, now)
            }
            RangeSpec::Within { span, to } => {
                let end = to.map(|p| p.end(now)).unwrap_or(now);
                end_window(span.before(end), *to, now)
            }
            RangeSpec::Calendar(point) => {
                let (since, to) = point.bounds(now);
                TimeWindow {
                    since,
                    to,
                    open: *point == TimePoint::Now,
                }
            }
        };

        if window.since > window.to {
            return Err(QueryError::range(format!(
                "range start {} is after range end {}",
                window.since, window.to
            )));
        }
        Ok(window)
    }

    /// Resolve a series spec, most recent window first
    ///
    /// The most recent window ends at the end of the step period containing
    /// `to` (or now).
    pub fn series_at(&self, spec: &SeriesSpec, now: i64) -> QueryResult<Vec<TimeWindow>> {
        let step = spec.step;
        let end = spec.to.map(|p| p.end(now)).unwrap_or(now);
        let anchor = step.advance(step.truncate(end.saturating_sub(1)), 1);

        let count = match (spec.stepn, spec.since) {
            (Some(n), _) => n as usize,
            (None, Some(since)) => {
                let start = since.start(now);
                if start >= end {
                    return Err(QueryError::range(format!(
                        "series start {} is not before series end {}",
                        start, end
                    )));
                }
                let floor = step.truncate(start);
                let mut count = 0usize;
                let mut boundary = anchor;
                while boundary > floor {
                    count += 1;
                    if count > MAX_SERIES_WINDOWS {
                        break;
                    }
                    boundary = step.advance(boundary, -1);
                }
                count
            }
            (None, None) => 1,
        };

        if count > MAX_SERIES_WINDOWS {
            return Err(QueryError::range(format!(
                "series would produce more than {} windows",
                MAX_SERIES_WINDOWS
            )));
        }

        let windows = (0..count)
            .map(|i| {
                let to = step.advance(anchor, -(i as i64));
                // Calendar bounds even when the period is still running
                TimeWindow::new(step.advance(to, -(spec.trail as i64)), to)
            })
            .collect();

        Ok(windows)
    }
}

fn end_window(since: i64, to: Option<TimePoint>, now: i64) -> TimeWindow {
    match to {
        None | Some(TimePoint::Now) => TimeWindow {
            since,
            to: now,
            open: true,
        },
        Some(point) => TimeWindow::new(since, point.end(now)),
    }
}
