//! Core data types for the scrobble store
//!
//! This module defines the fundamental types shared by the store and the
//! read-side engine:
//! - `Scrobble`: A single recorded play of a track
//! - `Track` / `Album`: What was played
//! - `TrackKey`: Normalized track identity
//! - `FirstSeen`: First-ever scrobble time per entity

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use unicode_normalization::UnicodeNormalization;

/// A single play event
///
/// Immutable once stored. `time` is a Unix timestamp in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scrobble {
    /// Unix timestamp in seconds
    pub time: i64,
    /// The track that was played
    pub track: Track,
    /// How long the track was actually listened to, in seconds
    #[serde(default)]
    pub duration: Option<u32>,
    /// Where the scrobble came from ("generic" or "client:<name>")
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_origin() -> String {
    "generic".to_string()
}

impl Scrobble {
    /// Create a scrobble at the current time
    pub fn new(track: Track) -> Self {
        Self {
            time: Utc::now().timestamp(),
            track,
            duration: None,
            origin: default_origin(),
        }
    }

    /// Create a scrobble at a specific time
    pub fn at(time: i64, track: Track) -> Self {
        Self {
            time,
            track,
            duration: None,
            origin: default_origin(),
        }
    }

    /// Builder method: set listened duration
    pub fn duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Builder method: set origin
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Check whether one of the track's artists is `artist` (normalized comparison)
    pub fn has_artist(&self, artist: &str) -> bool {
        let wanted = normalize_name(artist);
        self.track
            .artists
            .iter()
            .any(|a| normalize_name(a) == wanted)
    }
}

/// A track: title plus its ordered artist list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Track {
    pub title: String,
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<Album>,
    /// Track length in seconds, when known
    #[serde(default)]
    pub length: Option<u32>,
}

impl Track {
    pub fn new<S: Into<String>>(title: impl Into<String>, artists: impl IntoIterator<Item = S>) -> Self {
        Self {
            title: title.into(),
            artists: artists.into_iter().map(Into::into).collect(),
            album: None,
            length: None,
        }
    }

    /// Builder: set album
    pub fn album(mut self, album: Album) -> Self {
        self.album = Some(album);
        self
    }

    /// Identity of this track (normalized title + artist set)
    pub fn key(&self) -> TrackKey {
        TrackKey::new(&self.title, &self.artists)
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artists.join(", "), self.title)
    }
}

/// Album a track was released on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
}

impl Album {
    pub fn new<S: Into<String>>(name: impl Into<String>, artists: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            artists: artists.into_iter().map(Into::into).collect(),
        }
    }
}

/// Normalized identity of a track
///
/// Two tracks are the same entity when their normalized titles and normalized
/// artist sets are equal; artist order does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub title: String,
    pub artists: BTreeSet<String>,
}

impl TrackKey {
    pub fn new<S: AsRef<str>>(title: &str, artists: &[S]) -> Self {
        Self {
            title: normalize_name(title),
            artists: artists.iter().map(|a| normalize_name(a.as_ref())).collect(),
        }
    }
}

/// First-ever scrobble time per entity, used to break chart ties
#[derive(Debug, Clone, Default)]
pub struct FirstSeen {
    /// Keyed by normalized artist name
    pub artists: HashMap<String, i64>,
    pub tracks: HashMap<TrackKey, i64>,
}

impl FirstSeen {
    /// Record an event, keeping the earliest time per entity
    pub fn observe(&mut self, scrobble: &Scrobble) {
        for artist in &scrobble.track.artists {
            let entry = self
                .artists
                .entry(normalize_name(artist))
                .or_insert(scrobble.time);
            *entry = (*entry).min(scrobble.time);
        }
        let entry = self
            .tracks
            .entry(scrobble.track.key())
            .or_insert(scrobble.time);
        *entry = (*entry).min(scrobble.time);
    }

    pub fn artist(&self, name: &str) -> Option<i64> {
        self.artists.get(&normalize_name(name)).copied()
    }

    pub fn track(&self, key: &TrackKey) -> Option<i64> {
        self.tracks.get(key).copied()
    }
}

/// Normalize a name for lookups: Unicode NFD, combining marks dropped, lowercase
pub fn normalize_name(name: &str) -> String {
    name.nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Beyoncé"), "beyonce");
        assert_eq!(normalize_name("MÖTLEY CRÜE"), "motley crue");
        assert_eq!(normalize_name("queen"), normalize_name("Queen"));
    }

    #[test]
    fn test_track_key_ignores_artist_order_and_case() {
        let a = Track::new("Under Pressure", ["Queen", "David Bowie"]);
        let b = Track::new("under pressure", ["David Bowie", "QUEEN"]);
        let c = Track::new("Under Pressure", ["Queen"]);

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_scrobble_serialization_defaults() {
        let json = r#"{"time": 100, "track": {"title": "Bohemian Rhapsody", "artists": ["Queen"]}}"#;
        let scrobble: Scrobble = serde_json::from_str(json).unwrap();

        assert_eq!(scrobble.time, 100);
        assert_eq!(scrobble.origin, "generic");
        assert!(scrobble.duration.is_none());
        assert!(scrobble.has_artist("queen"));
        assert!(!scrobble.has_artist("Queens"));
    }

    #[test]
    fn test_first_seen_keeps_earliest() {
        let track = Track::new("Song", ["Artist"]);
        let mut first_seen = FirstSeen::default();

        first_seen.observe(&Scrobble::at(300, track.clone()));
        first_seen.observe(&Scrobble::at(100, track.clone()));
        first_seen.observe(&Scrobble::at(200, track.clone()));

        assert_eq!(first_seen.artist("ARTIST"), Some(100));
        assert_eq!(first_seen.track(&track.key()), Some(100));
        assert_eq!(first_seen.artist("Other"), None);
    }
}
