//! Chart aggregation
//!
//! Counts scrobbles per artist or per track inside a window and ranks the
//! result. Ranking is competition style: equal counts share a rank and the
//! next distinct count skips ahead (1, 1, 3). Ties are listed by first-ever
//! scrobble, then by name.

use crate::query::error::QueryResult;
use crate::store::{normalize_name, FirstSeen, Scrobble, ScrobbleStore, Track, TrackKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One ranked chart row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartEntry<E> {
    pub rank: u32,
    pub entity: E,
    pub count: u64,
}

/// Restricts which scrobbles contribute to a chart
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChartFilter {
    /// Scrobbles whose track lists this artist (normalized name)
    Artist(String),
    /// Scrobbles of exactly this track
    Track(TrackKey),
}

impl ChartFilter {
    pub fn artist(name: &str) -> Self {
        Self::Artist(normalize_name(name.trim()))
    }

    pub fn track(track: &Track) -> Self {
        Self::Track(track.key())
    }

    /// Direct membership; count-as rules do not apply here
    pub fn matches(&self, scrobble: &Scrobble) -> bool {
        match self {
            Self::Artist(artist) => scrobble
                .track
                .artists
                .iter()
                .any(|a| normalize_name(a) == *artist),
            Self::Track(key) => scrobble.track.key() == *key,
        }
    }
}

/// Per-entity tally before ranking
struct Tally<E> {
    entity: E,
    count: u64,
    first_seen: i64,
    sort_name: String,
}

/// Counts and ranks scrobbles
///
/// Holds the count-as table and first-seen times; the scrobbles of a window
/// are passed per call.
#[derive(Debug, Clone, Default)]
pub struct ChartAggregator {
    /// Normalized artist → canonical credited artist
    credits: HashMap<String, String>,
    first_seen: FirstSeen,
}

impl ChartAggregator {
    pub fn new(credits: HashMap<String, String>, mut first_seen: FirstSeen) -> Self {
        let credits: HashMap<String, String> = credits
            .into_iter()
            .map(|(from, to)| (normalize_name(&from), to))
            .collect();

        // A credit target is established as early as any artist counted as it
        for (from, to) in &credits {
            if let Some(time) = first_seen.artists.get(from).copied() {
                let target = first_seen.artists.entry(normalize_name(to)).or_insert(time);
                *target = (*target).min(time);
            }
        }

        Self {
            credits,
            first_seen,
        }
    }

    /// Fetch count-as rules and first-seen times from the store
    pub async fn load(store: &dyn ScrobbleStore) -> QueryResult<Self> {
        let credits = store.credit_rules().await?;
        let first_seen = store.first_seen().await?;
        Ok(Self::new(credits, first_seen))
    }

    /// The artist `artist`'s plays count toward
    pub fn credited<'a>(&'a self, artist: &'a str) -> &'a str {
        self.credits
            .get(&normalize_name(artist))
            .map(String::as_str)
            .unwrap_or(artist)
    }

    /// Rank artists by scrobbles
    ///
    /// Each scrobble credits every listed artist once, after count-as mapping.
    pub fn artist_chart(
        &self,
        scrobbles: &[Scrobble],
        filter: Option<&ChartFilter>,
    ) -> Vec<ChartEntry<String>> {
        let mut tallies: HashMap<String, Tally<String>> = HashMap::new();
        let mut credited: Vec<&str> = Vec::new();

        for scrobble in scrobbles {
            if filter.is_some_and(|f| !f.matches(scrobble)) {
                continue;
            }

            credited.clear();
            for artist in &scrobble.track.artists {
                let target = self.credited(artist);
                if !credited
                    .iter()
                    .any(|c| normalize_name(c) == normalize_name(target))
                {
                    credited.push(target);
                }
            }

            for artist in &credited {
                let key = normalize_name(artist);
                let first_seen = self.first_seen.artist(artist).unwrap_or(i64::MAX);
                tallies
                    .entry(key.clone())
                    .or_insert_with(|| Tally {
                        entity: artist.to_string(),
                        count: 0,
                        first_seen,
                        sort_name: key,
                    })
                    .count += 1;
            }
        }

        rank_entries(tallies.into_values().collect())
    }

    /// Rank tracks by scrobbles
    ///
    /// An artist filter keeps tracks that list that artist directly.
    pub fn track_chart(
        &self,
        scrobbles: &[Scrobble],
        filter: Option<&ChartFilter>,
    ) -> Vec<ChartEntry<Track>> {
        let mut tallies: HashMap<TrackKey, Tally<Track>> = HashMap::new();

        for scrobble in scrobbles {
            if filter.is_some_and(|f| !f.matches(scrobble)) {
                continue;
            }

            let key = scrobble.track.key();
            let first_seen = self.first_seen.track(&key).unwrap_or(i64::MAX);
            let sort_name = format!(
                "{}\u{0}{}",
                key.title,
                key.artists.iter().cloned().collect::<Vec<_>>().join("\u{0}")
            );
            tallies
                .entry(key)
                .or_insert_with(|| Tally {
                    entity: scrobble.track.clone(),
                    count: 0,
                    first_seen,
                    sort_name,
                })
                .count += 1;
        }

        rank_entries(tallies.into_values().collect())
    }
}

/// Sort tallies and assign competition ranks
fn rank_entries<E>(mut tallies: Vec<Tally<E>>) -> Vec<ChartEntry<E>> {
    tallies.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.sort_name.cmp(&b.sort_name))
    });

    let mut entries = Vec::with_capacity(tallies.len());
    let mut rank = 0u32;
    let mut previous: Option<u64> = None;

    for (position, tally) in tallies.into_iter().enumerate() {
        if previous != Some(tally.count) {
            rank = position as u32 + 1;
            previous = Some(tally.count);
        }
        entries.push(ChartEntry {
            rank,
            entity: tally.entity,
            count: tally.count,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrobble(time: i64, title: &str, artists: &[&str]) -> Scrobble {
        Scrobble::at(time, Track::new(title, artists.iter().copied()))
    }

    fn aggregator(scrobbles: &[Scrobble], credits: &[(&str, &str)]) -> ChartAggregator {
        let mut first_seen = FirstSeen::default();
        for s in scrobbles {
            first_seen.observe(s);
        }
        let credits = credits
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        ChartAggregator::new(credits, first_seen)
    }

    #[test]
    fn test_competition_ranking() {
        let scrobbles = vec![
            scrobble(100, "a1", &["A"]),
            scrobble(200, "a2", &["A"]),
            scrobble(300, "a3", &["A"]),
            scrobble(150, "b1", &["B"]),
            scrobble(250, "b2", &["B"]),
            scrobble(160, "c1", &["C"]),
        ];
        let ctx = aggregator(&scrobbles, &[]);

        let chart = ctx.artist_chart(&scrobbles, None);
        let rows: Vec<(u32, &str, u64)> = chart
            .iter()
            .map(|e| (e.rank, e.entity.as_str(), e.count))
            .collect();

        assert_eq!(rows, vec![(1, "A", 3), (2, "B", 2), (3, "C", 1)]);
    }

    #[test]
    fn test_credit_target_inherits_earliest_first_seen() {
        let scrobbles = vec![
            scrobble(100, "Living on My Own", &["Freddie Mercury"]),
            scrobble(200, "Heroes", &["David Bowie"]),
        ];
        let ctx = aggregator(&scrobbles, &[("Freddie Mercury", "Queen")]);

        let chart = ctx.artist_chart(&scrobbles, None);
        let rows: Vec<(u32, &str)> = chart.iter().map(|e| (e.rank, e.entity.as_str())).collect();

        // Equal counts: Queen's plays started first, through Freddie Mercury
        assert_eq!(rows, vec![(1, "Queen"), (1, "David Bowie")]);
    }

    #[test]
    fn test_ties_share_rank_and_order_by_first_seen() {
        let scrobbles = vec![
            scrobble(50, "x", &["Late"]),
            scrobble(10, "y", &["Early"]),
            scrobble(60, "x", &["Late"]),
            scrobble(70, "y", &["Early"]),
            scrobble(80, "z", &["Third"]),
        ];
        let ctx = aggregator(&scrobbles, &[]);

        let chart = ctx.artist_chart(&scrobbles, None);
        assert_eq!(chart[0].entity, "Early");
        assert_eq!(chart[0].rank, 1);
        assert_eq!(chart[1].entity, "Late");
        assert_eq!(chart[1].rank, 1);
        assert_eq!(chart[2].entity, "Third");
        assert_eq!(chart[2].rank, 3);
    }

    #[test]
    fn test_count_as_credits_target_once() {
        let scrobbles = vec![
            scrobble(1, "Solo", &["Member"]),
            scrobble(2, "Band Song", &["Band"]),
            scrobble(3, "Together", &["Band", "Member"]),
        ];
        let ctx = aggregator(&scrobbles, &[("Member", "Band")]);

        let chart = ctx.artist_chart(&scrobbles, None);
        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].entity, "Band");
        assert_eq!(chart[0].count, 3);
    }

    #[test]
    fn test_track_chart_with_artist_filter() {
        let scrobbles = vec![
            scrobble(1, "Under Pressure", &["Queen", "David Bowie"]),
            scrobble(2, "Under Pressure", &["David Bowie", "Queen"]),
            scrobble(3, "Heroes", &["David Bowie"]),
            scrobble(4, "Innuendo", &["Queen"]),
        ];
        let ctx = aggregator(&scrobbles, &[]);

        let all = ctx.track_chart(&scrobbles, None);
        assert_eq!(all[0].entity.title, "Under Pressure");
        assert_eq!(all[0].count, 2);
        assert_eq!(all.iter().map(|e| e.count).sum::<u64>(), 4);

        let filter = ChartFilter::artist("QUEEN");
        let queen = ctx.track_chart(&scrobbles, Some(&filter));
        let titles: Vec<&str> = queen.iter().map(|e| e.entity.title.as_str()).collect();
        assert_eq!(titles, vec!["Under Pressure", "Innuendo"]);
    }

    #[test]
    fn test_empty_window() {
        let ctx = ChartAggregator::default();
        assert!(ctx.artist_chart(&[], None).is_empty());
        assert!(ctx.track_chart(&[], None).is_empty());
    }
}
