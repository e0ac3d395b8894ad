//! Query Engine
//!
//! The read-side building blocks:
//!
//! - **timepoint**: Time points ("2021/03", "today") and spans ("7d")
//! - **range**: Range options → half-open windows and window series
//! - **chart**: Per-artist and per-track counting with competition ranking
//!
//! # Range Options
//!
//! ```text
//! since=<point>  to=<point>     explicit bounds
//! within=<span>  [to=<point>]   span measured back from the end
//! timerange=<point>             exactly one calendar period
//! step=<unit> [stepn=n] [trail=k] [since|to|timerange]
//!                               series of windows, most recent first
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use scrobbledb::query::{RangeOptions, TimeRangeResolver};
//!
//! let resolver = TimeRangeResolver::new();
//! resolver.register_first_event(first_scrobble);
//!
//! // Last week
//! let window = resolver.window(&RangeOptions::default().within("7d"))?;
//!
//! // Twelve months, one window each
//! let windows = resolver.windows(&RangeOptions::default().step("month").stepn(12))?;
//! ```

pub mod chart;
pub mod error;
pub mod range;
pub mod timepoint;

pub use chart::{ChartAggregator, ChartEntry, ChartFilter};
pub use error::{QueryError, QueryResult};
pub use range::{
    RangeOptions, RangeRequest, RangeSpec, SeriesSpec, StepUnit, TimeRangeResolver, TimeWindow,
};
pub use timepoint::{Span, TimePoint};
