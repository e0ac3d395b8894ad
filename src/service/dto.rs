//! Data Transfer Objects
//!
//! Input and output types of the service operations.
//! These types are serialized/deserialized to/from JSON.

use crate::ledger::Medals;
use crate::query::TimeWindow;
use crate::store::{normalize_name, Album, Scrobble, Track};
use serde::{Deserialize, Serialize};

// ============================================
// INGEST DTOs
// ============================================

/// A scrobble as submitted by a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrobbleSubmission {
    /// Track artists, at least one
    #[serde(default)]
    pub artists: Vec<String>,
    /// Track title, non-empty
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
    /// Defaults to the track artists
    #[serde(default)]
    pub album_artists: Option<Vec<String>>,
    /// Seconds actually listened
    #[serde(default)]
    pub duration: Option<u32>,
    /// Track length in seconds
    #[serde(default)]
    pub length: Option<u32>,
    /// Unix seconds, defaults to now
    #[serde(default)]
    pub time: Option<i64>,
    /// Submitting client, recorded as origin `client:<name>`
    #[serde(default)]
    pub client: Option<String>,
}

impl ScrobbleSubmission {
    pub fn new<S: Into<String>>(artists: impl IntoIterator<Item = S>, title: impl Into<String>) -> Self {
        Self {
            artists: artists.into_iter().map(Into::into).collect(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Clean the submission into a scrobble, or explain why it is rejected
    ///
    /// Names are trimmed, blank artists dropped and repeated artists
    /// collapsed.
    pub fn into_scrobble(self, now: i64) -> Result<Scrobble, String> {
        let artists = clean_artists(self.artists);
        if artists.is_empty() {
            return Err("no artists".to_string());
        }
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err("empty title".to_string());
        }

        let mut track = Track::new(title, artists.iter().cloned());
        track.length = self.length;

        if let Some(album) = self.album.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()) {
            let album_artists = self
                .album_artists
                .map(clean_artists)
                .filter(|a| !a.is_empty())
                .unwrap_or(artists);
            track = track.album(Album::new(album, album_artists));
        }

        let origin = match self.client.as_deref().map(str::trim) {
            Some(client) if !client.is_empty() => format!("client:{}", client),
            _ => "generic".to_string(),
        };

        let mut scrobble = Scrobble::at(self.time.unwrap_or(now), track).origin(origin);
        scrobble.duration = self.duration;
        Ok(scrobble)
    }
}

fn clean_artists(artists: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(artists.len());
    for artist in artists {
        let artist = artist.trim();
        if artist.is_empty() {
            continue;
        }
        let key = normalize_name(artist);
        if !cleaned.iter().any(|a| normalize_name(a) == key) {
            cleaned.push(artist.to_string());
        }
    }
    cleaned
}

/// Ingestion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Success,
    Failure,
}

/// Ingestion result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    /// The scrobble as stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrobble: Option<Scrobble>,
    /// Why the submission was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubmitOutcome {
    pub fn success(scrobble: Scrobble) -> Self {
        Self {
            status: SubmitStatus::Success,
            scrobble: Some(scrobble),
            reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: SubmitStatus::Failure,
            scrobble: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SubmitStatus::Success
    }
}

// ============================================
// QUERY DTOs
// ============================================

/// An artist or track, by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityRef {
    Artist { name: String },
    Track { title: String, artists: Vec<String> },
}

impl EntityRef {
    pub fn artist(name: impl Into<String>) -> Self {
        Self::Artist { name: name.into() }
    }

    pub fn track<S: Into<String>>(title: impl Into<String>, artists: impl IntoIterator<Item = S>) -> Self {
        Self::Track {
            title: title.into(),
            artists: artists.into_iter().map(Into::into).collect(),
        }
    }
}

/// Scrobble volume of one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseEntry {
    pub range: TimeWindow,
    pub scrobbles: u64,
}

/// Rank of an entity in one window; `None` when unranked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub range: TimeWindow,
    pub rank: Option<u32>,
}

/// Number one of one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntry<E> {
    pub range: TimeWindow,
    pub entity: Option<E>,
    pub scrobbles: u64,
}

/// Lifetime play-count tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certification {
    Gold,
    Platinum,
    Diamond,
}

/// Scrobble counts needed for each certification tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationThresholds {
    #[serde(default = "default_gold")]
    pub gold: u64,
    #[serde(default = "default_platinum")]
    pub platinum: u64,
    #[serde(default = "default_diamond")]
    pub diamond: u64,
}

fn default_gold() -> u64 {
    250
}

fn default_platinum() -> u64 {
    500
}

fn default_diamond() -> u64 {
    1000
}

impl Default for CertificationThresholds {
    fn default() -> Self {
        Self {
            gold: default_gold(),
            platinum: default_platinum(),
            diamond: default_diamond(),
        }
    }
}

impl CertificationThresholds {
    /// Highest tier reached by `scrobbles`
    pub fn tier(&self, scrobbles: u64) -> Option<Certification> {
        if scrobbles >= self.diamond {
            Some(Certification::Diamond)
        } else if scrobbles >= self.platinum {
            Some(Certification::Platinum)
        } else if scrobbles >= self.gold {
            Some(Certification::Gold)
        } else {
            None
        }
    }
}

/// Artist overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub artist: String,
    /// Scrobbles listing this artist directly
    pub scrobbles: u64,
    /// All-time chart position
    pub position: Option<u32>,
    /// Artist this one's plays are credited to, when it is not ranked itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
    /// Artists credited to this one
    pub associated: Vec<String>,
    pub certification: Option<Certification>,
    /// Present once the medal ledger is built
    pub medals: Option<Medals>,
    pub topweeks: Option<u32>,
}

/// Track overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track: Track,
    pub scrobbles: u64,
    pub position: Option<u32>,
    pub certification: Option<Certification>,
    pub medals: Option<Medals>,
    pub topweeks: Option<u32>,
}

/// What to search for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Artist,
    Track,
}

/// Search hits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchResults {
    Artists(Vec<String>),
    Tracks(Vec<Track>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            Self::Artists(artists) => artists.len(),
            Self::Tracks(tracks) => tracks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_cleaning() {
        let scrobble = ScrobbleSubmission::new([" Queen ", "", "queen", "David Bowie"], " Under Pressure ")
            .album("Hot Space")
            .client("mobile")
            .into_scrobble(1_000)
            .unwrap();

        assert_eq!(scrobble.time, 1_000);
        assert_eq!(scrobble.track.title, "Under Pressure");
        assert_eq!(scrobble.track.artists, vec!["Queen", "David Bowie"]);
        let album = scrobble.track.album.unwrap();
        assert_eq!(album.artists, vec!["Queen", "David Bowie"]);
        assert_eq!(scrobble.origin, "client:mobile");
    }

    #[test]
    fn test_submission_rejections() {
        let empty_artists = ScrobbleSubmission::new(Vec::<String>::new(), "Song");
        assert_eq!(empty_artists.into_scrobble(0), Err("no artists".to_string()));

        let blank_artists = ScrobbleSubmission::new(["  "], "Song");
        assert!(blank_artists.into_scrobble(0).is_err());

        let no_title = ScrobbleSubmission::new(["Queen"], "   ");
        assert_eq!(no_title.into_scrobble(0), Err("empty title".to_string()));
    }

    #[test]
    fn test_submission_from_json() {
        let json = r#"{"artists": ["Queen"], "title": "Innuendo", "time": 42, "duration": 300}"#;
        let submission: ScrobbleSubmission = serde_json::from_str(json).unwrap();
        let scrobble = submission.into_scrobble(0).unwrap();

        assert_eq!(scrobble.time, 42);
        assert_eq!(scrobble.duration, Some(300));
        assert_eq!(scrobble.origin, "generic");
    }

    #[test]
    fn test_certification_tiers() {
        let thresholds = CertificationThresholds::default();
        assert_eq!(thresholds.tier(249), None);
        assert_eq!(thresholds.tier(250), Some(Certification::Gold));
        assert_eq!(thresholds.tier(999), Some(Certification::Platinum));
        assert_eq!(thresholds.tier(5000), Some(Certification::Diamond));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(SubmitOutcome::failure("no artists")).unwrap();
        assert_eq!(json["status"], "failure");
        assert!(json.get("scrobble").is_none());
    }
}
