//! Medal Ledger
//!
//! Precomputed per-year medals (top three of each calendar year's chart) and
//! weekly number-one counts for artists and tracks. Rebuilt wholesale by
//! [`MedalLedger::update`]: the new snapshot is built off to the side and
//! swapped in, so readers see either the old or the new ledger, never a mix.

use crate::query::chart::{ChartAggregator, ChartEntry};
use crate::query::timepoint::year_of;
use crate::query::{QueryResult, StepUnit};
use crate::store::{normalize_name, Scrobble, ScrobbleStore, TrackKey};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Medal tier, from a rank in a yearly chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    pub fn from_rank(rank: u32) -> Option<Self> {
        match rank {
            1 => Some(Self::Gold),
            2 => Some(Self::Silver),
            3 => Some(Self::Bronze),
            _ => None,
        }
    }
}

/// Years in which an entity earned each medal, ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medals {
    pub gold: Vec<i32>,
    pub silver: Vec<i32>,
    pub bronze: Vec<i32>,
}

impl Medals {
    fn award(&mut self, medal: Medal, year: i32) {
        match medal {
            Medal::Gold => self.gold.push(year),
            Medal::Silver => self.silver.push(year),
            Medal::Bronze => self.bronze.push(year),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gold.is_empty() && self.silver.is_empty() && self.bronze.is_empty()
    }
}

/// One complete ledger state
#[derive(Debug, Default)]
struct LedgerSnapshot {
    /// Normalized artist name → medals
    artist_medals: HashMap<String, Medals>,
    track_medals: HashMap<TrackKey, Medals>,
    /// Normalized artist name → weeks at number one
    artist_topweeks: HashMap<String, u32>,
    track_topweeks: HashMap<TrackKey, u32>,
    /// When this snapshot was built
    updated_at: Option<i64>,
}

/// Per-year medals and weekly number-one counts
#[derive(Debug, Default)]
pub struct MedalLedger {
    snapshot: RwLock<Arc<LedgerSnapshot>>,
}

impl MedalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the ledger from the store as of now
    pub async fn update(&self, store: &dyn ScrobbleStore) -> QueryResult<()> {
        self.update_at(store, Utc::now().timestamp()).await
    }

    /// Rebuild the ledger from the store as of `now`
    ///
    /// Medals cover every calendar year that has scrobbles. Weekly counts
    /// cover every complete week from the first scrobble's week up to the
    /// week containing `now`, exclusive.
    pub async fn update_at(&self, store: &dyn ScrobbleStore, now: i64) -> QueryResult<()> {
        let aggregator = ChartAggregator::load(store).await?;
        let scrobbles = store.scrobbles_between(i64::MIN, i64::MAX).await?;

        let mut staged = LedgerSnapshot {
            updated_at: Some(now),
            ..LedgerSnapshot::default()
        };

        let years = award_medals(&aggregator, &scrobbles, &mut staged);
        let weeks = count_topweeks(&aggregator, &scrobbles, now, &mut staged);

        *self.snapshot.write().await = Arc::new(staged);
        info!(years, weeks, scrobbles = scrobbles.len(), "Medal ledger updated");
        Ok(())
    }

    /// Whether the ledger has been built at least once
    pub async fn is_ready(&self) -> bool {
        self.snapshot.read().await.updated_at.is_some()
    }

    pub async fn artist_medals(&self, artist: &str) -> Medals {
        let snapshot = self.current().await;
        snapshot
            .artist_medals
            .get(&normalize_name(artist))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn track_medals(&self, track: &TrackKey) -> Medals {
        let snapshot = self.current().await;
        snapshot.track_medals.get(track).cloned().unwrap_or_default()
    }

    /// Weeks the artist topped the weekly artist chart
    pub async fn artist_topweeks(&self, artist: &str) -> u32 {
        let snapshot = self.current().await;
        snapshot
            .artist_topweeks
            .get(&normalize_name(artist))
            .copied()
            .unwrap_or(0)
    }

    /// Weeks the track topped the weekly track chart
    pub async fn track_topweeks(&self, track: &TrackKey) -> u32 {
        let snapshot = self.current().await;
        snapshot.track_topweeks.get(track).copied().unwrap_or(0)
    }

    async fn current(&self) -> Arc<LedgerSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }
}

/// Slice of time-ordered `scrobbles` with `since <= time < to`
fn slice_between(scrobbles: &[Scrobble], since: i64, to: i64) -> &[Scrobble] {
    let start = scrobbles.partition_point(|s| s.time < since);
    let end = scrobbles.partition_point(|s| s.time < to).max(start);
    &scrobbles[start..end]
}

fn year_start(year: i32) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)).timestamp())
}

fn award_medals(
    aggregator: &ChartAggregator,
    scrobbles: &[Scrobble],
    staged: &mut LedgerSnapshot,
) -> usize {
    let (Some(first), Some(last)) = (
        scrobbles.first().and_then(|s| year_of(s.time)),
        scrobbles.last().and_then(|s| year_of(s.time)),
    ) else {
        return 0;
    };

    let mut years = 0;
    for year in first..=last {
        let (Some(since), Some(to)) = (year_start(year), year_start(year + 1)) else {
            continue;
        };
        let slice = slice_between(scrobbles, since, to);
        if slice.is_empty() {
            continue;
        }
        years += 1;

        for entry in medal_rows(aggregator.artist_chart(slice, None)) {
            if let Some(medal) = Medal::from_rank(entry.rank) {
                staged
                    .artist_medals
                    .entry(normalize_name(&entry.entity))
                    .or_default()
                    .award(medal, year);
            }
        }
        for entry in medal_rows(aggregator.track_chart(slice, None)) {
            if let Some(medal) = Medal::from_rank(entry.rank) {
                staged
                    .track_medals
                    .entry(entry.entity.key())
                    .or_default()
                    .award(medal, year);
            }
        }
        debug!(year, scrobbles = slice.len(), "Awarded medals");
    }
    years
}

fn medal_rows<E>(chart: Vec<ChartEntry<E>>) -> impl Iterator<Item = ChartEntry<E>> {
    chart.into_iter().take_while(|entry| entry.rank <= 3)
}

fn count_topweeks(
    aggregator: &ChartAggregator,
    scrobbles: &[Scrobble],
    now: i64,
    staged: &mut LedgerSnapshot,
) -> usize {
    let Some(first) = scrobbles.first() else {
        return 0;
    };

    let current_week = StepUnit::Week.truncate(now);
    let mut week = StepUnit::Week.truncate(first.time);
    let mut weeks = 0;

    while week < current_week {
        let next = StepUnit::Week.advance(week, 1);
        if next <= week {
            break;
        }
        let slice = slice_between(scrobbles, week, next);
        week = next;
        if slice.is_empty() {
            continue;
        }
        weeks += 1;

        for entry in aggregator
            .artist_chart(slice, None)
            .into_iter()
            .take_while(|e| e.rank == 1)
        {
            *staged
                .artist_topweeks
                .entry(normalize_name(&entry.entity))
                .or_default() += 1;
        }
        for entry in aggregator
            .track_chart(slice, None)
            .into_iter()
            .take_while(|e| e.rank == 1)
        {
            *staged
                .track_topweeks
                .entry(entry.entity.key())
                .or_default() += 1;
        }
    }
    weeks
}
