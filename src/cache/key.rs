//! Cache keys and cached values

use crate::query::{ChartEntry, ChartFilter, TimeWindow};
use crate::store::{Scrobble, Track};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Which aggregate a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    ArtistChart,
    TrackChart,
    ScrobbleList,
    ScrobbleCount,
}

/// Window identity for caching
///
/// Open windows ("up to now") are keyed by their start only; `to` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub since: i64,
    pub to: Option<i64>,
}

impl WindowKey {
    /// Whether a new event at `time` can change results for this window
    pub fn affected_by(&self, time: i64) -> bool {
        match self.to {
            None => true,
            Some(to) => self.since <= time && time < to,
        }
    }
}

impl From<&TimeWindow> for WindowKey {
    fn from(window: &TimeWindow) -> Self {
        Self {
            since: window.since,
            to: (!window.open).then_some(window.to),
        }
    }
}

/// Full identity of a cached aggregate
///
/// `end` is where the window was resolved to end. It is not part of the
/// identity, so an open window keeps one slot as "now" moves, but an entry
/// only answers a lookup that resolved to the same end.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub shape: QueryShape,
    pub window: WindowKey,
    pub filter: Option<ChartFilter>,
    pub end: i64,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.window == other.window && self.filter == other.filter
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shape.hash(state);
        self.window.hash(state);
        self.filter.hash(state);
    }
}

impl CacheKey {
    pub fn new(shape: QueryShape, window: &TimeWindow, filter: Option<ChartFilter>) -> Self {
        Self {
            shape,
            window: window.into(),
            filter,
            end: window.to,
        }
    }

    pub fn artist_chart(window: &TimeWindow) -> Self {
        Self::new(QueryShape::ArtistChart, window, None)
    }

    pub fn track_chart(window: &TimeWindow, filter: Option<ChartFilter>) -> Self {
        Self::new(QueryShape::TrackChart, window, filter)
    }

    pub fn scrobble_list(window: &TimeWindow, filter: Option<ChartFilter>) -> Self {
        Self::new(QueryShape::ScrobbleList, window, filter)
    }

    pub fn scrobble_count(window: &TimeWindow, filter: Option<ChartFilter>) -> Self {
        Self::new(QueryShape::ScrobbleCount, window, filter)
    }
}

/// A cached aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Artists(Arc<Vec<ChartEntry<String>>>),
    Tracks(Arc<Vec<ChartEntry<Track>>>),
    Scrobbles(Arc<Vec<Scrobble>>),
    Count(u64),
}

impl CachedValue {
    pub fn into_artists(self) -> Option<Arc<Vec<ChartEntry<String>>>> {
        match self {
            Self::Artists(chart) => Some(chart),
            _ => None,
        }
    }

    pub fn into_tracks(self) -> Option<Arc<Vec<ChartEntry<Track>>>> {
        match self {
            Self::Tracks(chart) => Some(chart),
            _ => None,
        }
    }

    pub fn into_scrobbles(self) -> Option<Arc<Vec<Scrobble>>> {
        match self {
            Self::Scrobbles(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_count(self) -> Option<u64> {
        match self {
            Self::Count(count) => Some(count),
            _ => None,
        }
    }
}
